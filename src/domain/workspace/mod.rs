//! Workspace domain: tenants, APIs and keyspaces

mod entity;
mod repository;

pub use entity::{Api, Keyspace, Workspace};
pub use repository::WorkspaceRepository;
