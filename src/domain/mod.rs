//! Domain layer - Core business logic and entities

pub mod api_key;
pub mod audit;
pub mod error;
pub mod id;
pub mod permission;
pub mod ratelimit;
pub mod rbac;
pub mod unit_of_work;
pub mod workspace;

pub use api_key::{Key, KeyRepository, KeyState, KeyValidationError};
pub use audit::{AuditLog, AuditLogEntry, AuditLogRepository};
pub use error::DomainError;
pub use id::{
    ApiId, AuditLogId, IdPrefix, KeyId, KeyspaceId, PermissionId, RoleId, WorkspaceId,
};
pub use permission::{GrantedPermissions, PermissionQuery};
pub use ratelimit::{CounterStore, RatelimitConfig, RatelimitDecision, RatelimitRequest};
pub use rbac::{Permission, RbacRepository, Role};
pub use unit_of_work::{Mutation, MutationKind, TransactionManager, UnitOfWork};
pub use workspace::{Api, Keyspace, Workspace, WorkspaceRepository};
