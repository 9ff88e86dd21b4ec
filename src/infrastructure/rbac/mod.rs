//! RBAC management

mod service;

pub use service::PermissionService;
