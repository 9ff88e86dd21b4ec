//! Audit trail domain

mod entity;
mod repository;

pub use entity::{
    ActorType, AuditActor, AuditContext, AuditEvent, AuditLog, AuditLogEntry, AuditLogFilter,
    AuditResource,
};
pub use repository::AuditLogRepository;
