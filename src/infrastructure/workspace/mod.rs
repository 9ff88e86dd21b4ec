//! Workspace and API management

mod bootstrap;
mod service;

pub use bootstrap::{BootstrapResult, BootstrapService};
pub use service::ApiService;
