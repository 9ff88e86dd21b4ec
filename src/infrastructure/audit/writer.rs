//! Audit log writer

use chrono::Utc;
use tracing::debug;

use crate::domain::audit::{AuditLog, AuditLogEntry};
use crate::domain::id::AuditLogId;
use crate::domain::unit_of_work::{Mutation, UnitOfWork};

/// Stages audit rows into the unit of work carrying the audited mutation
///
/// There is no other write path for audit logs, so a row commits or rolls back together
/// with the change it describes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogWriter;

impl AuditLogWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, uow: &mut dyn UnitOfWork, entry: AuditLogEntry) -> AuditLogId {
        let log = AuditLog::from_entry(entry, Utc::now());
        let id = log.id.clone();

        debug!(
            audit_log_id = %id,
            event = %log.event,
            workspace_id = %log.workspace_id,
            "Staged audit log"
        );

        uow.stage(Mutation::InsertAuditLog(log));
        id
    }
}
