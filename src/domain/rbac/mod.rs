//! RBAC domain: permissions, roles and the grants attaching them to keys

mod entity;
mod repository;

pub use entity::{
    validate_permission_name, KeyPermission, KeyRole, Permission, PermissionRef, Role,
    RolePermission,
};
pub use repository::RbacRepository;
