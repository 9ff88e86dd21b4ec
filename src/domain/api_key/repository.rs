//! Key repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::Key;
use crate::domain::id::{KeyId, KeyspaceId};
use crate::domain::DomainError;

/// Read access to keys
///
/// Keys are looked up by hash only; there is deliberately no plaintext lookup.
#[async_trait]
pub trait KeyRepository: Send + Sync + Debug {
    /// Find a key by the hash of its plaintext, including soft-deleted rows
    ///
    /// The caller decides how to report deleted keys.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Key>, DomainError>;

    /// Get a key by ID, excluding soft-deleted rows
    async fn find(&self, id: &KeyId) -> Result<Option<Key>, DomainError> {
        Ok(self
            .find_including_deleted(id)
            .await?
            .filter(|key| !key.is_deleted()))
    }

    /// Get a key by ID regardless of its deletion state
    async fn find_including_deleted(&self, id: &KeyId) -> Result<Option<Key>, DomainError>;

    /// List live keys in a keyspace
    async fn list_by_keyspace(&self, keyspace_id: &KeyspaceId) -> Result<Vec<Key>, DomainError>;
}
