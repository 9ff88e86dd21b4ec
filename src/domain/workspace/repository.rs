//! Workspace and API repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{Api, Keyspace, Workspace};
use crate::domain::id::{ApiId, KeyspaceId, WorkspaceId};
use crate::domain::DomainError;

/// Read access to workspaces, APIs and keyspaces
///
/// Writes go through a [`crate::domain::unit_of_work::UnitOfWork`].
#[async_trait]
pub trait WorkspaceRepository: Send + Sync + Debug {
    async fn find_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, DomainError>;

    /// Get an API, excluding soft-deleted rows
    async fn find_api(&self, id: &ApiId) -> Result<Option<Api>, DomainError> {
        Ok(self
            .find_api_including_deleted(id)
            .await?
            .filter(|api| !api.is_deleted()))
    }

    /// Get an API regardless of its deletion state
    async fn find_api_including_deleted(&self, id: &ApiId) -> Result<Option<Api>, DomainError>;

    /// Get the API owning a keyspace
    async fn find_api_by_keyspace(
        &self,
        keyspace_id: &KeyspaceId,
    ) -> Result<Option<Api>, DomainError>;

    async fn find_keyspace(&self, id: &KeyspaceId) -> Result<Option<Keyspace>, DomainError>;
}
