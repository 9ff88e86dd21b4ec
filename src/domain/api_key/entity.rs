//! Key entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::id::{KeyId, KeyspaceId, WorkspaceId};
use crate::domain::ratelimit::RatelimitConfig;

/// A hashed API key
///
/// The plaintext secret is never stored; the key is only ever found through `hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    id: KeyId,
    /// base64(sha256(plaintext))
    hash: String,
    /// Display-safe leading characters of the plaintext
    start: String,
    workspace_id: WorkspaceId,
    keyspace_id: KeyspaceId,
    /// Workspace managed by this key; only set on root keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    for_workspace_id: Option<WorkspaceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<serde_json::Value>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    ratelimits: Vec<RatelimitConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

/// Lifecycle state relevant to verification, checked in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Usable,
    Deleted,
    Disabled,
    Expired,
}

impl Key {
    /// Create a new key for a keyspace
    pub fn new(
        hash: impl Into<String>,
        start: impl Into<String>,
        workspace_id: WorkspaceId,
        keyspace_id: KeyspaceId,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: KeyId::generate(),
            hash: hash.into(),
            start: start.into(),
            workspace_id,
            keyspace_id,
            for_workspace_id: None,
            owner_id: None,
            name: None,
            meta: None,
            enabled: true,
            ratelimits: Vec::new(),
            expires_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Turn the key into a root key managing `workspace_id`
    pub fn for_workspace(mut self, workspace_id: WorkspaceId) -> Self {
        self.for_workspace_id = Some(workspace_id);
        self
    }

    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_ratelimit(mut self, ratelimit: RatelimitConfig) -> Self {
        self.ratelimits.retain(|r| r.name() != ratelimit.name());
        self.ratelimits.push(ratelimit);
        self
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    // Getters

    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    pub fn keyspace_id(&self) -> &KeyspaceId {
        &self.keyspace_id
    }

    pub fn for_workspace_id(&self) -> Option<&WorkspaceId> {
        self.for_workspace_id.as_ref()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn meta(&self) -> Option<&serde_json::Value> {
        self.meta.as_ref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn ratelimits(&self) -> &[RatelimitConfig] {
        &self.ratelimits
    }

    pub fn ratelimit(&self, name: &str) -> Option<&RatelimitConfig> {
        self.ratelimits.iter().find(|r| r.name() == name)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    // Status checks

    pub fn is_root_key(&self) -> bool {
        self.for_workspace_id.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Verification state at `now`; deletion wins over disablement, which wins over expiry
    pub fn state_at(&self, now: DateTime<Utc>) -> KeyState {
        if self.is_deleted() {
            KeyState::Deleted
        } else if !self.enabled {
            KeyState::Disabled
        } else if self.is_expired_at(now) {
            KeyState::Expired
        } else {
            KeyState::Usable
        }
    }

    // Mutators

    /// Mark as deleted, keeping the row for audit continuity
    pub fn soft_delete(&mut self) {
        if self.deleted_at.is_none() {
            let now = Utc::now();
            self.deleted_at = Some(now);
            self.updated_at = now;
        }
    }
}
