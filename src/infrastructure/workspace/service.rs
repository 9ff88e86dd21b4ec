use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::audit::{AuditEvent, AuditResource};
use crate::domain::id::ApiId;
use crate::domain::permission::actions;
use crate::domain::unit_of_work::{Mutation, TransactionManager};
use crate::domain::workspace::WorkspaceRepository;
use crate::domain::DomainError;
use crate::infrastructure::audit::AuditLogWriter;
use crate::infrastructure::authorization::RootKeyContext;
use crate::infrastructure::context::GatewayContext;

/// API management
#[derive(Debug, Clone)]
pub struct ApiService {
    workspaces: Arc<dyn WorkspaceRepository>,
    transactions: Arc<dyn TransactionManager>,
    audit: AuditLogWriter,
}

impl ApiService {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            workspaces: Arc::clone(&context.workspaces),
            transactions: Arc::clone(&context.transactions),
            audit: context.audit,
        }
    }

    /// Soft-delete an API; its keys are kept
    pub async fn delete_api(&self, root: &RootKeyContext, api_id: &str) -> Result<(), DomainError> {
        if api_id.is_empty() {
            return Err(DomainError::validation("apiId must not be empty"));
        }
        root.require_for(&actions::delete_api(), api_id)?;

        let not_found = || DomainError::not_found(format!("API '{}' not found", api_id));
        let id = ApiId::parse(api_id).map_err(|_| not_found())?;
        let mut api = self
            .workspaces
            .find_api(&id)
            .await?
            .filter(|api| api.workspace_id == root.workspace_id)
            .ok_or_else(not_found)?;

        if api.delete_protection {
            warn!("Refused to delete protected API: api_id={}", api.id);
            return Err(DomainError::delete_protected(format!(
                "API '{}' is protected from deletion",
                api.id
            )));
        }

        api.soft_delete();
        info!("Deleting API: api_id={}", api.id);

        let resource = AuditResource::new("api", api.id.as_str())
            .with_meta(serde_json::json!({ "name": api.name }));
        let description = format!("Deleted {}", api.id);

        let mut uow = self.transactions.begin().await?;
        uow.stage(Mutation::UpdateApi(api));
        self.audit.record(
            uow.as_mut(),
            root.audit_entry(AuditEvent::ApiDelete, description, vec![resource]),
        );
        uow.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::unit_of_work::MutationKind;
    use crate::domain::workspace::{Api, Keyspace};
    use crate::infrastructure::authorization::{
        KeyVerifier, RootKeyAuthenticator, VerifyCode, VerifyKeyRequest,
    };
    use crate::infrastructure::testing::Seed;

    async fn root(seed: &Seed, permissions: &[&str]) -> RootKeyContext {
        let (plaintext, _) = seed.root_key(permissions).await;
        RootKeyAuthenticator::new(&seed.context)
            .authenticate(&plaintext)
            .await
            .unwrap()
    }

    async fn protected_api(seed: &Seed) -> Api {
        let keyspace = Keyspace::new(seed.workspace.id.clone());
        let api = Api::new(seed.workspace.id.clone(), "ledger", keyspace.id.clone())
            .with_delete_protection(true);
        seed.db
            .execute(vec![
                Mutation::InsertKeyspace(keyspace),
                Mutation::InsertApi(api.clone()),
            ])
            .await
            .unwrap();
        api
    }

    #[tokio::test]
    async fn test_delete_api() {
        let seed = Seed::new().await;
        let root = root(&seed, &["api.*.delete_api"]).await;
        let (plaintext, _) = seed.data_key(|key| key).await;

        ApiService::new(&seed.context)
            .delete_api(&root, seed.api.id.as_str())
            .await
            .unwrap();

        assert!(seed.context.workspaces.find_api(&seed.api.id).await.unwrap().is_none());
        let stored = seed
            .context
            .workspaces
            .find_api_including_deleted(&seed.api.id)
            .await
            .unwrap()
            .unwrap();
        let deleted_at = stored.deleted_at.unwrap();
        assert!((chrono::Utc::now() - deleted_at).num_seconds() < 10);

        // Keys survive but no longer verify against the deleted API
        let verified = KeyVerifier::new(&seed.context)
            .verify(VerifyKeyRequest::new(&plaintext).with_api_id(seed.api.id.as_str()))
            .await
            .unwrap();
        assert_eq!(verified.code, VerifyCode::NotFound);

        let logs = seed.audit_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event, AuditEvent::ApiDelete);
        assert_eq!(logs[0].resources[0].id, seed.api.id.as_str());
    }

    #[tokio::test]
    async fn test_delete_protected_api_writes_nothing() {
        let seed = Seed::new().await;
        let root = root(&seed, &["*"]).await;
        let api = protected_api(&seed).await;

        let result = ApiService::new(&seed.context)
            .delete_api(&root, api.id.as_str())
            .await;

        assert!(matches!(result, Err(DomainError::DeleteProtected { .. })));
        assert!(seed.context.workspaces.find_api(&api.id).await.unwrap().is_some());
        assert!(seed.audit_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_api_authorization_precedes_protection() {
        let seed = Seed::new().await;
        let root = root(&seed, &["api.*.create_key"]).await;
        let api = protected_api(&seed).await;

        let result = ApiService::new(&seed.context)
            .delete_api(&root, api.id.as_str())
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_delete_api_scoped_grant() {
        let seed = Seed::new().await;
        let other = protected_api(&seed).await;
        let scoped = format!("api.{}.delete_api", seed.api.id);
        let root = root(&seed, &[scoped.as_str()]).await;
        let service = ApiService::new(&seed.context);

        assert!(matches!(
            service.delete_api(&root, other.id.as_str()).await,
            Err(DomainError::Forbidden { .. })
        ));
        service.delete_api(&root, seed.api.id.as_str()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_api_not_found() {
        let seed = Seed::new().await;
        let root = root(&seed, &["*"]).await;
        let service = ApiService::new(&seed.context);

        assert!(matches!(
            service.delete_api(&root, ApiId::generate().as_str()).await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(matches!(
            service.delete_api(&root, "api_1").await,
            Err(DomainError::NotFound { .. })
        ));

        service.delete_api(&root, seed.api.id.as_str()).await.unwrap();
        assert!(matches!(
            service.delete_api(&root, seed.api.id.as_str()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_api_rolls_back_when_audit_fails() {
        let seed = Seed::new().await;
        let root = root(&seed, &["*"]).await;

        seed.db.fail_on(Some(MutationKind::InsertAuditLog));
        let result = ApiService::new(&seed.context)
            .delete_api(&root, seed.api.id.as_str())
            .await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert!(seed.context.workspaces.find_api(&seed.api.id).await.unwrap().is_some());
    }
}
