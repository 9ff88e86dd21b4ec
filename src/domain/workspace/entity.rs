//! Workspace, API and keyspace entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::id::{ApiId, KeyspaceId, WorkspaceId};

/// Tenant boundary owning APIs, keys, roles, permissions and audit logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkspaceId::generate(),
            name: name.into(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

/// Named collection of keys scoped to one API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyspace {
    pub id: KeyspaceId,
    pub workspace_id: WorkspaceId,
    /// Prefix applied to new keys when the create request names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_prefix: Option<String>,
    /// Random byte length applied when the create request names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_bytes: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl Keyspace {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            id: KeyspaceId::generate(),
            workspace_id,
            default_prefix: None,
            default_bytes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_default_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = Some(prefix.into());
        self
    }
}

/// Named resource space inside a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Api {
    pub id: ApiId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub keyspace_id: KeyspaceId,
    /// Delete operations are refused while set
    #[serde(default)]
    pub delete_protection: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Api {
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>, keyspace_id: KeyspaceId) -> Self {
        Self {
            id: ApiId::generate(),
            workspace_id,
            name: name.into(),
            keyspace_id,
            delete_protection: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn with_delete_protection(mut self, enabled: bool) -> Self {
        self.delete_protection = enabled;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Mark as deleted, keeping the row for audit continuity
    pub fn soft_delete(&mut self) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_soft_delete_is_idempotent() {
        let ws = Workspace::new("acme");
        let ks = Keyspace::new(ws.id.clone());
        let mut api = Api::new(ws.id, "payments", ks.id);

        assert!(!api.is_deleted());
        api.soft_delete();
        let first = api.deleted_at;
        api.soft_delete();

        assert!(api.is_deleted());
        assert_eq!(api.deleted_at, first);
    }

    #[test]
    fn test_api_delete_protection_defaults_off() {
        let ws = Workspace::new("acme");
        let ks = Keyspace::new(ws.id.clone());
        let api = Api::new(ws.id, "payments", ks.id);
        assert!(!api.delete_protection);
        assert!(api.with_delete_protection(true).delete_protection);
    }
}
