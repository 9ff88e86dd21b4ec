use std::sync::Arc;

use tracing::info;

use crate::domain::audit::{AuditEvent, AuditResource};
use crate::domain::id::PermissionId;
use crate::domain::permission::actions;
use crate::domain::rbac::{Permission, RbacRepository};
use crate::domain::unit_of_work::{Mutation, TransactionManager};
use crate::domain::DomainError;
use crate::infrastructure::audit::AuditLogWriter;
use crate::infrastructure::authorization::RootKeyContext;
use crate::infrastructure::context::GatewayContext;

/// Permission management
#[derive(Debug, Clone)]
pub struct PermissionService {
    rbac: Arc<dyn RbacRepository>,
    transactions: Arc<dyn TransactionManager>,
    audit: AuditLogWriter,
}

impl PermissionService {
    pub fn new(context: &GatewayContext) -> Self {
        Self {
            rbac: Arc::clone(&context.rbac),
            transactions: Arc::clone(&context.transactions),
            audit: context.audit,
        }
    }

    /// Create a permission in the root key's workspace
    pub async fn create_permission(
        &self,
        root: &RootKeyContext,
        name: &str,
        description: Option<String>,
    ) -> Result<PermissionId, DomainError> {
        root.require(&actions::create_permission())?;

        let permission = Permission::new(root.workspace_id.clone(), name, description)?;

        if self
            .rbac
            .find_permission_by_name(&root.workspace_id, name)
            .await?
            .is_some()
        {
            return Err(DomainError::conflict(format!(
                "Permission '{}' already exists",
                name
            )));
        }

        info!(
            "Creating permission: permission_id={}, name={}",
            permission.id, permission.name
        );

        let id = permission.id.clone();
        let resource = AuditResource::new("permission", id.as_str())
            .with_meta(serde_json::json!({ "name": permission.name }));

        let mut uow = self.transactions.begin().await?;
        uow.stage(Mutation::InsertPermission(permission));
        self.audit.record(
            uow.as_mut(),
            root.audit_entry(
                AuditEvent::PermissionCreate,
                format!("Created {} ({})", id, name),
                vec![resource],
            ),
        );
        uow.commit().await?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::unit_of_work::MutationKind;
    use crate::infrastructure::authorization::RootKeyAuthenticator;
    use crate::infrastructure::testing::Seed;

    async fn root(seed: &Seed, permissions: &[&str]) -> RootKeyContext {
        let (plaintext, _) = seed.root_key(permissions).await;
        RootKeyAuthenticator::new(&seed.context)
            .authenticate(&plaintext)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_permission() {
        let seed = Seed::new().await;
        let root = root(&seed, &["rbac.*.create_permission"]).await;

        let id = PermissionService::new(&seed.context)
            .create_permission(&root, "domain.create", Some("Create domains".into()))
            .await
            .unwrap();

        let stored = seed.permission("domain.create").await.unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.description.as_deref(), Some("Create domains"));

        let logs = seed.audit_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event, AuditEvent::PermissionCreate);
        assert_eq!(logs[0].resources[0].id, id.as_str());
    }

    #[tokio::test]
    async fn test_create_permission_duplicate_conflicts() {
        let seed = Seed::new().await;
        let root = root(&seed, &["*"]).await;
        let service = PermissionService::new(&seed.context);

        service.create_permission(&root, "domain.create", None).await.unwrap();
        let duplicate = service.create_permission(&root, "domain.create", None).await;

        assert!(matches!(duplicate, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_create_permission_rejects_invalid_names() {
        let seed = Seed::new().await;
        let root = root(&seed, &["*"]).await;
        let service = PermissionService::new(&seed.context);

        for name in ["", "has space", "slash/not/allowed"] {
            assert!(matches!(
                service.create_permission(&root, name, None).await,
                Err(DomainError::Validation { .. })
            ));
        }
        let too_long = "a".repeat(513);
        assert!(matches!(
            service.create_permission(&root, &too_long, None).await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_permission_forbidden() {
        let seed = Seed::new().await;
        let root = root(&seed, &["rbac.*.remove_permission_from_key"]).await;

        let result = PermissionService::new(&seed.context)
            .create_permission(&root, "domain.create", None)
            .await;

        assert!(matches!(result, Err(DomainError::Forbidden { .. })));
        assert!(seed.permission("domain.create").await.is_none());
    }

    #[tokio::test]
    async fn test_audit_failure_discards_permission() {
        let seed = Seed::new().await;
        let root = root(&seed, &["*"]).await;

        seed.db.fail_on(Some(MutationKind::InsertAuditLog));
        let result = PermissionService::new(&seed.context)
            .create_permission(&root, "domain.create", None)
            .await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert!(seed.permission("domain.create").await.is_none());
    }
}
