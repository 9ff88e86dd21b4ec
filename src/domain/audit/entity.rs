//! Audit log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::id::{AuditLogId, WorkspaceId};

/// Who performed an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Key,
    User,
    System,
}

impl AuditActor {
    pub fn key(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Key,
            id: id.into(),
        }
    }

    pub fn system(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::System,
            id: id.into(),
        }
    }
}

/// A resource touched by an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl AuditResource {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Request context an action was performed from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Audited event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEvent {
    #[serde(rename = "workspace.create")]
    WorkspaceCreate,
    #[serde(rename = "api.create")]
    ApiCreate,
    #[serde(rename = "api.delete")]
    ApiDelete,
    #[serde(rename = "key.create")]
    KeyCreate,
    #[serde(rename = "key.delete")]
    KeyDelete,
    #[serde(rename = "permission.create")]
    PermissionCreate,
    #[serde(rename = "authorization.connect_permission_and_key")]
    ConnectPermissionAndKey,
    #[serde(rename = "authorization.disconnect_permission_and_key")]
    DisconnectPermissionAndKey,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkspaceCreate => "workspace.create",
            Self::ApiCreate => "api.create",
            Self::ApiDelete => "api.delete",
            Self::KeyCreate => "key.create",
            Self::KeyDelete => "key.delete",
            Self::PermissionCreate => "permission.create",
            Self::ConnectPermissionAndKey => "authorization.connect_permission_and_key",
            Self::DisconnectPermissionAndKey => "authorization.disconnect_permission_and_key",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry to be recorded; the writer assigns the id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogEntry {
    pub workspace_id: WorkspaceId,
    pub event: AuditEvent,
    pub actor: AuditActor,
    pub description: String,
    pub resources: Vec<AuditResource>,
    pub context: AuditContext,
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: AuditLogId,
    pub workspace_id: WorkspaceId,
    pub event: AuditEvent,
    pub actor: AuditActor,
    pub description: String,
    pub resources: Vec<AuditResource>,
    pub context: AuditContext,
    pub time: DateTime<Utc>,
}

impl AuditLog {
    pub fn from_entry(entry: AuditLogEntry, time: DateTime<Utc>) -> Self {
        Self {
            id: AuditLogId::generate(),
            workspace_id: entry.workspace_id,
            event: entry.event,
            actor: entry.actor,
            description: entry.description,
            resources: entry.resources,
            context: entry.context,
            time,
        }
    }
}

/// Filter for listing audit logs
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub event: Option<AuditEvent>,
    pub actor_id: Option<String>,
    pub resource_id: Option<String>,
}

impl AuditLogFilter {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.event.is_none_or(|e| e == log.event)
            && self.actor_id.as_ref().is_none_or(|a| *a == log.actor.id)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|r| log.resources.iter().any(|res| res.id == *r))
    }
}
