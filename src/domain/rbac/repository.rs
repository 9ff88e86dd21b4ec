//! RBAC repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{Permission, Role};
use crate::domain::id::{KeyId, PermissionId, RoleId, WorkspaceId};
use crate::domain::permission::GrantedPermissions;
use crate::domain::DomainError;

/// Read access to permissions, roles and their grants
#[async_trait]
pub trait RbacRepository: Send + Sync + Debug {
    async fn find_permission(&self, id: &PermissionId) -> Result<Option<Permission>, DomainError>;

    async fn find_permission_by_name(
        &self,
        workspace_id: &WorkspaceId,
        name: &str,
    ) -> Result<Option<Permission>, DomainError>;

    /// Permissions granted directly to a key
    async fn list_key_permissions(&self, key_id: &KeyId) -> Result<Vec<Permission>, DomainError>;

    async fn list_key_roles(&self, key_id: &KeyId) -> Result<Vec<Role>, DomainError>;

    async fn list_role_permissions(&self, role_id: &RoleId) -> Result<Vec<Permission>, DomainError>;

    /// Effective permission set: direct grants united with role-derived grants
    async fn granted_permissions(&self, key_id: &KeyId) -> Result<GrantedPermissions, DomainError> {
        let mut granted: GrantedPermissions = self
            .list_key_permissions(key_id)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();

        for role in self.list_key_roles(key_id).await? {
            granted.extend(
                self.list_role_permissions(&role.id)
                    .await?
                    .into_iter()
                    .map(|p| p.name),
            );
        }

        Ok(granted)
    }
}
