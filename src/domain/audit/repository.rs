//! Audit log repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{AuditLog, AuditLogFilter};
use crate::domain::id::WorkspaceId;
use crate::domain::DomainError;

/// Read-only access to audit logs
///
/// Rows are only ever inserted through a unit of work and never updated or deleted.
#[async_trait]
pub trait AuditLogRepository: Send + Sync + Debug {
    /// List a workspace's audit logs matching `filter`, oldest first
    async fn list(
        &self,
        workspace_id: &WorkspaceId,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLog>, DomainError>;
}
