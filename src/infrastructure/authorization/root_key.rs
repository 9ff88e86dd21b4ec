//! Management-plane authentication

use std::sync::Arc;

use tracing::debug;

use crate::domain::api_key::{Key, KeyRepository, KeyState};
use crate::domain::audit::{AuditActor, AuditContext, AuditEvent, AuditLogEntry, AuditResource};
use crate::domain::id::WorkspaceId;
use crate::domain::permission::{GrantedPermissions, PermissionQuery};
use crate::domain::rbac::RbacRepository;
use crate::domain::DomainError;
use crate::infrastructure::api_key::KeyCodec;
use crate::infrastructure::context::GatewayContext;
use crate::infrastructure::ratelimit::Clock;

/// An authenticated root key and what it may do
#[derive(Debug, Clone)]
pub struct RootKeyContext {
    pub key: Key,
    /// Workspace the root key manages
    pub workspace_id: WorkspaceId,
    pub granted: GrantedPermissions,
    /// Where the request came from, recorded on audit rows
    pub request: AuditContext,
}

impl RootKeyContext {
    pub fn with_request_context(mut self, request: AuditContext) -> Self {
        self.request = request;
        self
    }

    /// Fail with `Forbidden` unless the granted permissions satisfy `query`
    pub fn require(&self, query: &PermissionQuery) -> Result<(), DomainError> {
        if query.evaluate(&self.granted) {
            Ok(())
        } else {
            Err(forbidden(query))
        }
    }

    /// Like [`require`](Self::require) with parameterized leaves bound to `resource_id`
    pub fn require_for(&self, query: &PermissionQuery, resource_id: &str) -> Result<(), DomainError> {
        if query.evaluate_for(resource_id, &self.granted) {
            Ok(())
        } else {
            Err(forbidden(&query.resolve(resource_id)))
        }
    }

    pub fn actor(&self) -> AuditActor {
        AuditActor::key(self.key.id().as_str())
    }

    /// Audit entry for an action taken with this key
    pub fn audit_entry(
        &self,
        event: AuditEvent,
        description: impl Into<String>,
        resources: Vec<AuditResource>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            workspace_id: self.workspace_id.clone(),
            event,
            actor: self.actor(),
            description: description.into(),
            resources,
            context: self.request.clone(),
        }
    }
}

fn forbidden(query: &PermissionQuery) -> DomainError {
    DomainError::forbidden(format!("Missing one of these permissions: {}", query))
}

/// Resolves bearer tokens to root keys
#[derive(Debug, Clone)]
pub struct RootKeyAuthenticator {
    keys: Arc<dyn KeyRepository>,
    rbac: Arc<dyn RbacRepository>,
    clock: Arc<dyn Clock>,
}

impl RootKeyAuthenticator {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            keys: Arc::clone(&context.keys),
            rbac: Arc::clone(&context.rbac),
            clock: Arc::clone(&context.clock),
        }
    }

    /// Authenticate a bearer token
    ///
    /// Every failure reads as `Unauthorized` so callers cannot probe which keys exist.
    pub async fn authenticate(&self, token: &str) -> Result<RootKeyContext, DomainError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DomainError::unauthorized("Missing root key"));
        }

        let key = self
            .keys
            .find_by_hash(&KeyCodec::hash(token))
            .await?
            .ok_or_else(|| DomainError::unauthorized("The root key is invalid"))?;

        let Some(workspace_id) = key.for_workspace_id().cloned() else {
            debug!("Rejected non-root key on management plane: key_id={}", key.id());
            return Err(DomainError::unauthorized("The key is not a root key"));
        };

        match key.state_at(self.clock.now()) {
            KeyState::Usable => {}
            state => {
                debug!("Rejected root key: key_id={}, state={:?}", key.id(), state);
                return Err(DomainError::unauthorized("The root key is invalid"));
            }
        }

        let granted = self.rbac.granted_permissions(key.id()).await?;

        debug!(
            "Authenticated root key: key_id={}, workspace_id={}, permissions={}",
            key.id(),
            workspace_id,
            granted.len()
        );

        Ok(RootKeyContext {
            key,
            workspace_id,
            granted,
            request: AuditContext::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::actions;
    use crate::infrastructure::testing::Seed;

    #[tokio::test]
    async fn test_authenticates_root_key() {
        let seed = Seed::new().await;
        let (plaintext, _) = seed.root_key(&["*"]).await;

        let root = RootKeyAuthenticator::new(&seed.context)
            .authenticate(&plaintext)
            .await
            .unwrap();

        assert_eq!(root.workspace_id, seed.workspace.id);
        assert!(root.granted.contains("*"));
        assert!(root.require(&actions::create_permission()).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_empty_tokens() {
        let seed = Seed::new().await;
        let authenticator = RootKeyAuthenticator::new(&seed.context);

        assert!(matches!(
            authenticator.authenticate("").await,
            Err(DomainError::Unauthorized { .. })
        ));
        assert!(matches!(
            authenticator.authenticate("root_doesnotexist").await,
            Err(DomainError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_data_plane_key() {
        let seed = Seed::new().await;
        let (plaintext, _) = seed.data_key(|key| key).await;

        let result = RootKeyAuthenticator::new(&seed.context)
            .authenticate(&plaintext)
            .await;
        assert!(matches!(result, Err(DomainError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_rejects_disabled_root_key() {
        let seed = Seed::new().await;
        let (plaintext, _) = seed
            .root_key_with(&["*"], |key| key.with_enabled(false))
            .await;

        let result = RootKeyAuthenticator::new(&seed.context)
            .authenticate(&plaintext)
            .await;
        assert!(matches!(result, Err(DomainError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_root_key_expires_on_the_shared_clock() {
        let seed = Seed::new().await;
        let expires = seed.clock.now() + chrono::Duration::seconds(10);
        let (plaintext, _) = seed
            .root_key_with(&["*"], |key| key.with_expiration(expires))
            .await;
        let authenticator = RootKeyAuthenticator::new(&seed.context);

        assert!(authenticator.authenticate(&plaintext).await.is_ok());

        seed.clock.advance(std::time::Duration::from_secs(10));
        assert!(matches!(
            authenticator.authenticate(&plaintext).await,
            Err(DomainError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_require_for_binds_resource() {
        let seed = Seed::new().await;
        let scoped = format!("api.{}.delete_key", seed.api.id);
        let (plaintext, _) = seed.root_key(&[scoped.as_str()]).await;

        let root = RootKeyAuthenticator::new(&seed.context)
            .authenticate(&plaintext)
            .await
            .unwrap();

        assert!(root.require_for(&actions::delete_key(), seed.api.id.as_str()).is_ok());
        assert!(matches!(
            root.require_for(&actions::delete_key(), "api_other"),
            Err(DomainError::Forbidden { .. })
        ));
        assert!(matches!(
            root.require(&actions::delete_key()),
            Err(DomainError::Forbidden { .. })
        ));
    }
}
