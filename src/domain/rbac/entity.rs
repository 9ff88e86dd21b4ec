//! Role-based access control entities

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::id::{KeyId, PermissionId, RoleId, WorkspaceId};
use crate::domain::DomainError;

const MAX_PERMISSION_NAME_LENGTH: usize = 512;

static PERMISSION_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:*-]+$").expect("valid permission name pattern"));

/// A named permission, unique per workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        validate_permission_name(&name)?;

        Ok(Self {
            id: PermissionId::generate(),
            workspace_id,
            name,
            description,
            created_at: Utc::now(),
        })
    }
}

/// Permission names: 1..=512 characters of `[A-Za-z0-9._:*-]`
pub fn validate_permission_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::validation("Permission name cannot be empty"));
    }

    if name.len() > MAX_PERMISSION_NAME_LENGTH {
        return Err(DomainError::validation(format!(
            "Permission name exceeds maximum length of {} characters",
            MAX_PERMISSION_NAME_LENGTH
        )));
    }

    if !PERMISSION_NAME_PATTERN.is_match(name) {
        return Err(DomainError::validation(format!(
            "Invalid permission name '{}': only letters, digits and . _ : * - are allowed",
            name
        )));
    }

    Ok(())
}

/// A named bundle of permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            id: RoleId::generate(),
            workspace_id,
            name: name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// Direct grant of a permission to a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPermission {
    pub key_id: KeyId,
    pub permission_id: PermissionId,
    pub workspace_id: WorkspaceId,
}

/// Grant of a role to a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRole {
    pub key_id: KeyId,
    pub role_id: RoleId,
    pub workspace_id: WorkspaceId,
}

/// Membership of a permission in a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
    pub workspace_id: WorkspaceId,
}

/// Reference to a permission by ID or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    Id { id: String },
    Name { name: String },
}
