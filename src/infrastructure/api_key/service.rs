//! Key service
//!
//! Management operations on keys. Every operation is authorized against the caller's
//! root key before anything is written, and each write commits together with its
//! audit rows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::api_key::{Key, KeyRepository};
use crate::domain::audit::{AuditEvent, AuditResource};
use crate::domain::id::{ApiId, KeyId, PermissionId};
use crate::domain::permission::actions;
use crate::domain::ratelimit::RatelimitConfig;
use crate::domain::rbac::{KeyPermission, Permission, PermissionRef, RbacRepository};
use crate::domain::unit_of_work::{Mutation, TransactionManager};
use crate::domain::workspace::{Api, WorkspaceRepository};
use crate::domain::DomainError;
use crate::infrastructure::audit::AuditLogWriter;
use crate::infrastructure::authorization::RootKeyContext;
use crate::infrastructure::context::GatewayContext;
use crate::infrastructure::ratelimit::Clock;

use super::generator::KeyCodec;

/// Parameters for creating a key
#[derive(Debug, Clone, Default)]
pub struct CreateKeyRequest {
    pub api_id: String,
    pub prefix: Option<String>,
    pub byte_length: Option<usize>,
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub expires: Option<DateTime<Utc>>,
    pub ratelimits: Vec<RatelimitConfig>,
    pub enabled: Option<bool>,
}

/// Result of creating a new key
#[derive(Debug)]
pub struct CreateKeyResult {
    pub key_id: KeyId,
    /// The full plaintext key (only returned once)
    pub key: String,
}

/// Key management service
#[derive(Debug, Clone)]
pub struct KeyService {
    keys: Arc<dyn KeyRepository>,
    workspaces: Arc<dyn WorkspaceRepository>,
    rbac: Arc<dyn RbacRepository>,
    transactions: Arc<dyn TransactionManager>,
    codec: KeyCodec,
    audit: AuditLogWriter,
    clock: Arc<dyn Clock>,
}

impl KeyService {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            keys: Arc::clone(&context.keys),
            workspaces: Arc::clone(&context.workspaces),
            rbac: Arc::clone(&context.rbac),
            transactions: Arc::clone(&context.transactions),
            codec: context.codec,
            audit: context.audit,
            clock: Arc::clone(&context.clock),
        }
    }

    /// Create a key in an API's keyspace
    pub async fn create_key(
        &self,
        root: &RootKeyContext,
        request: CreateKeyRequest,
    ) -> Result<CreateKeyResult, DomainError> {
        if request.api_id.is_empty() {
            return Err(DomainError::validation("apiId must not be empty"));
        }
        root.require_for(&actions::create_key(), &request.api_id)?;

        let api = self.workspace_api(root, &request.api_id).await?;
        let keyspace = self
            .workspaces
            .find_keyspace(&api.keyspace_id)
            .await?
            .ok_or_else(|| DomainError::internal(format!("API '{}' has no keyspace", api.id)))?;

        if let Some(expires) = request.expires
            && expires <= self.clock.now()
        {
            return Err(DomainError::validation("expires must be in the future"));
        }

        let prefix = request.prefix.or(keyspace.default_prefix);
        let generated = self
            .codec
            .create(prefix.as_deref(), request.byte_length.or(keyspace.default_bytes))?;

        let mut key = Key::new(
            generated.hash,
            generated.start,
            api.workspace_id.clone(),
            keyspace.id.clone(),
        )
        .with_enabled(request.enabled.unwrap_or(true));

        if let Some(owner_id) = request.owner_id {
            key = key.with_owner_id(owner_id);
        }
        if let Some(name) = request.name {
            key = key.with_name(name);
        }
        if let Some(meta) = request.meta {
            key = key.with_meta(meta);
        }
        if let Some(expires) = request.expires {
            key = key.with_expiration(expires);
        }
        for ratelimit in request.ratelimits {
            key = key.with_ratelimit(ratelimit);
        }

        let key_id = key.id().clone();
        info!("Creating key: key_id={}, api_id={}", key_id, api.id);

        let mut uow = self.transactions.begin().await?;
        uow.stage(Mutation::InsertKey(key));
        self.audit.record(
            uow.as_mut(),
            root.audit_entry(
                AuditEvent::KeyCreate,
                format!("Created {} in {}", key_id, api.id),
                vec![
                    AuditResource::new("key", key_id.as_str()),
                    AuditResource::new("api", api.id.as_str()),
                ],
            ),
        );
        uow.commit().await?;

        Ok(CreateKeyResult {
            key_id,
            key: generated.key,
        })
    }

    /// Get a live key
    pub async fn get_key(&self, root: &RootKeyContext, key_id: &str) -> Result<Key, DomainError> {
        let key = self.workspace_key(root, key_id).await?;
        root.require_for(&actions::read_key(), &self.api_of(&key).await?)?;

        Ok(key)
    }

    /// Soft-delete a key
    pub async fn delete_key(&self, root: &RootKeyContext, key_id: &str) -> Result<(), DomainError> {
        let mut key = self.workspace_key(root, key_id).await?;
        let api_id = self.api_of(&key).await?;
        root.require_for(&actions::delete_key(), &api_id)?;

        key.soft_delete();
        info!("Deleting key: key_id={}", key.id());

        let resource = AuditResource::new("key", key.id().as_str());
        let description = format!("Deleted {}", key.id());

        let mut uow = self.transactions.begin().await?;
        uow.stage(Mutation::UpdateKey(key));
        self.audit.record(
            uow.as_mut(),
            root.audit_entry(AuditEvent::KeyDelete, description, vec![resource]),
        );
        uow.commit().await
    }

    /// Remove directly granted permissions from a key
    ///
    /// Permissions that exist but are not granted to the key are skipped.
    pub async fn remove_permissions(
        &self,
        root: &RootKeyContext,
        key_id: &str,
        permissions: &[PermissionRef],
    ) -> Result<(), DomainError> {
        if key_id.is_empty() {
            return Err(DomainError::validation("keyId must not be empty"));
        }
        if permissions.is_empty() {
            return Err(DomainError::validation("permissions must not be empty"));
        }
        root.require(&actions::remove_permission_from_key())?;

        let key = self.workspace_key(root, key_id).await?;

        let mut resolved = Vec::with_capacity(permissions.len());
        for reference in permissions {
            resolved.push(self.resolve_permission(root, reference).await?);
        }

        let granted: HashSet<PermissionId> = self
            .rbac
            .list_key_permissions(key.id())
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut seen = HashSet::new();
        let removable: Vec<Permission> = resolved
            .into_iter()
            .filter(|p| granted.contains(&p.id) && seen.insert(p.id.clone()))
            .collect();

        if removable.is_empty() {
            debug!("No granted permissions to remove: key_id={}", key.id());
            return Ok(());
        }

        info!(
            "Removing permissions from key: key_id={}, permissions={}",
            key.id(),
            removable
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        );

        let mut uow = self.transactions.begin().await?;
        let mut resources = Vec::with_capacity(removable.len() + 1);
        for permission in &removable {
            uow.stage(Mutation::DeleteKeyPermission(KeyPermission {
                key_id: key.id().clone(),
                permission_id: permission.id.clone(),
                workspace_id: key.workspace_id().clone(),
            }));
            resources.push(
                AuditResource::new("permission", permission.id.as_str())
                    .with_meta(serde_json::json!({ "name": permission.name })),
            );
        }
        resources.push(AuditResource::new("key", key.id().as_str()));

        self.audit.record(
            uow.as_mut(),
            root.audit_entry(
                AuditEvent::DisconnectPermissionAndKey,
                format!(
                    "Disconnected {} permission(s) from {}",
                    removable.len(),
                    key.id()
                ),
                resources,
            ),
        );
        uow.commit().await
    }

    async fn resolve_permission(
        &self,
        root: &RootKeyContext,
        reference: &PermissionRef,
    ) -> Result<Permission, DomainError> {
        let permission = match reference {
            PermissionRef::Id { id } => match PermissionId::parse(id.as_str()) {
                Ok(id) => self.rbac.find_permission(&id).await?,
                Err(_) => None,
            },
            PermissionRef::Name { name } => {
                self.rbac
                    .find_permission_by_name(&root.workspace_id, name)
                    .await?
            }
        };

        permission
            .filter(|p| p.workspace_id == root.workspace_id)
            .ok_or_else(|| match reference {
                PermissionRef::Id { id } => {
                    DomainError::not_found(format!("Permission '{}' not found", id))
                }
                PermissionRef::Name { name } => {
                    DomainError::not_found(format!("Permission '{}' not found", name))
                }
            })
    }

    /// A live key owned by the root key's workspace
    async fn workspace_key(&self, root: &RootKeyContext, key_id: &str) -> Result<Key, DomainError> {
        if key_id.is_empty() {
            return Err(DomainError::validation("keyId must not be empty"));
        }

        let not_found = || DomainError::not_found(format!("Key '{}' not found", key_id));
        let id = KeyId::parse(key_id).map_err(|_| not_found())?;

        self.keys
            .find(&id)
            .await?
            .filter(|key| *key.workspace_id() == root.workspace_id)
            .ok_or_else(not_found)
    }

    /// A live API owned by the root key's workspace
    async fn workspace_api(&self, root: &RootKeyContext, api_id: &str) -> Result<Api, DomainError> {
        let not_found = || DomainError::not_found(format!("API '{}' not found", api_id));
        let id = ApiId::parse(api_id).map_err(|_| not_found())?;

        self.workspaces
            .find_api(&id)
            .await?
            .filter(|api| api.workspace_id == root.workspace_id)
            .ok_or_else(not_found)
    }

    /// ID of the API owning the key's keyspace; empty when the keyspace has none
    async fn api_of(&self, key: &Key) -> Result<String, DomainError> {
        Ok(self
            .workspaces
            .find_api_by_keyspace(key.keyspace_id())
            .await?
            .map(|api| api.id.to_string())
            .unwrap_or_default())
    }
}
