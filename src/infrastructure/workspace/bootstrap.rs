//! First-run setup
//!
//! Creates a workspace with one API and a root key that can manage everything in it.
//! Without this there is no key able to call the management API.

use std::sync::Arc;

use tracing::info;

use crate::domain::api_key::Key;
use crate::domain::audit::{AuditActor, AuditContext, AuditEvent, AuditLogEntry, AuditResource};
use crate::domain::id::{ApiId, KeyId, WorkspaceId};
use crate::domain::permission::WILDCARD;
use crate::domain::rbac::{KeyPermission, Permission};
use crate::domain::unit_of_work::{Mutation, TransactionManager};
use crate::domain::workspace::{Api, Keyspace, Workspace};
use crate::domain::DomainError;
use crate::infrastructure::api_key::KeyCodec;
use crate::infrastructure::audit::AuditLogWriter;
use crate::infrastructure::context::GatewayContext;

const ACTOR: &str = "bootstrap";
const ROOT_KEY_PREFIX: &str = "root";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_id: WorkspaceId,
    pub api_id: ApiId,
    pub root_key_id: KeyId,
    /// Plaintext root key, shown once
    pub root_key: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapService {
    transactions: Arc<dyn TransactionManager>,
    codec: KeyCodec,
    audit: AuditLogWriter,
}

impl BootstrapService {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            transactions: Arc::clone(&context.transactions),
            codec: context.codec,
            audit: context.audit,
        }
    }

    pub async fn bootstrap(
        &self,
        workspace_name: &str,
        api_name: &str,
    ) -> Result<BootstrapResult, DomainError> {
        if workspace_name.trim().is_empty() || api_name.trim().is_empty() {
            return Err(DomainError::validation(
                "Workspace and API names must not be empty",
            ));
        }

        let workspace = Workspace::new(workspace_name);
        let keyspace = Keyspace::new(workspace.id.clone());
        let api = Api::new(workspace.id.clone(), api_name, keyspace.id.clone());
        let root_keyspace = Keyspace::new(workspace.id.clone());

        let generated = self.codec.create(Some(ROOT_KEY_PREFIX), None)?;
        let root_key = Key::new(
            generated.hash,
            generated.start,
            workspace.id.clone(),
            root_keyspace.id.clone(),
        )
        .for_workspace(workspace.id.clone())
        .with_name("bootstrap");
        let everything = Permission::new(workspace.id.clone(), WILDCARD, None)?;

        info!(
            "Bootstrapping workspace: workspace_id={}, api_id={}, root_key_id={}",
            workspace.id,
            api.id,
            root_key.id()
        );

        let result = BootstrapResult {
            workspace_id: workspace.id.clone(),
            api_id: api.id.clone(),
            root_key_id: root_key.id().clone(),
            root_key: generated.key,
        };

        let entry = |event: AuditEvent, description: String, resources: Vec<AuditResource>| {
            AuditLogEntry {
                workspace_id: workspace.id.clone(),
                event,
                actor: AuditActor::system(ACTOR),
                description,
                resources,
                context: AuditContext::default(),
            }
        };
        let audit_rows = vec![
            entry(
                AuditEvent::WorkspaceCreate,
                format!("Created {}", workspace.id),
                vec![AuditResource::new("workspace", workspace.id.as_str())],
            ),
            entry(
                AuditEvent::ApiCreate,
                format!("Created {}", api.id),
                vec![AuditResource::new("api", api.id.as_str())],
            ),
            entry(
                AuditEvent::KeyCreate,
                format!("Created root key {}", root_key.id()),
                vec![AuditResource::new("key", root_key.id().as_str())],
            ),
            entry(
                AuditEvent::PermissionCreate,
                format!("Created {} ({})", everything.id, WILDCARD),
                vec![AuditResource::new("permission", everything.id.as_str())],
            ),
            entry(
                AuditEvent::ConnectPermissionAndKey,
                format!("Connected {} and {}", everything.id, root_key.id()),
                vec![
                    AuditResource::new("permission", everything.id.as_str()),
                    AuditResource::new("key", root_key.id().as_str()),
                ],
            ),
        ];

        let grant = KeyPermission {
            key_id: root_key.id().clone(),
            permission_id: everything.id.clone(),
            workspace_id: workspace.id.clone(),
        };

        let mut uow = self.transactions.begin().await?;
        uow.stage(Mutation::InsertWorkspace(workspace));
        uow.stage(Mutation::InsertKeyspace(keyspace));
        uow.stage(Mutation::InsertKeyspace(root_keyspace));
        uow.stage(Mutation::InsertApi(api));
        uow.stage(Mutation::InsertKey(root_key));
        uow.stage(Mutation::InsertPermission(everything));
        uow.stage(Mutation::InsertKeyPermission(grant));
        for row in audit_rows {
            self.audit.record(uow.as_mut(), row);
        }
        uow.commit().await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditLogFilter;
    use crate::domain::unit_of_work::MutationKind;
    use crate::infrastructure::api_key::{CreateKeyRequest, KeyService};
    use crate::infrastructure::authorization::RootKeyAuthenticator;
    use crate::infrastructure::storage::InMemoryDatabase;

    #[tokio::test]
    async fn test_bootstrap_creates_usable_root_key() {
        let db = InMemoryDatabase::new();
        let context = GatewayContext::in_memory_default(db);

        let result = BootstrapService::new(&context)
            .bootstrap("acme", "payments")
            .await
            .unwrap();
        assert!(result.root_key.starts_with("root_"));

        let root = RootKeyAuthenticator::new(&context)
            .authenticate(&result.root_key)
            .await
            .unwrap();
        assert_eq!(root.workspace_id, result.workspace_id);

        KeyService::new(&context)
            .create_key(
                &root,
                CreateKeyRequest {
                    api_id: result.api_id.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let bootstrap_rows = context
            .audit_logs
            .list(
                &result.workspace_id,
                &AuditLogFilter {
                    actor_id: Some(ACTOR.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(bootstrap_rows.len(), 5);
    }

    #[tokio::test]
    async fn test_bootstrap_is_atomic() {
        let db = InMemoryDatabase::new();
        let context = GatewayContext::in_memory_default(db.clone());

        db.fail_on(Some(MutationKind::InsertAuditLog));
        let result = BootstrapService::new(&context).bootstrap("acme", "payments").await;
        assert!(result.is_err());

        db.fail_on(None);
        let result = BootstrapService::new(&context)
            .bootstrap("acme", "payments")
            .await
            .unwrap();
        assert!(context
            .workspaces
            .find_workspace(&result.workspace_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_empty_names() {
        let context = GatewayContext::in_memory_default(InMemoryDatabase::new());

        assert!(matches!(
            BootstrapService::new(&context).bootstrap(" ", "payments").await,
            Err(DomainError::Validation { .. })
        ));
    }
}
