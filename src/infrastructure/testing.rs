//! Fixtures shared by infrastructure and API tests

use std::sync::Arc;

use crate::domain::api_key::Key;
use crate::domain::audit::{AuditLog, AuditLogFilter};
use crate::domain::rbac::{KeyPermission, Permission};
use crate::domain::unit_of_work::{Mutation, TransactionManager};
use crate::domain::workspace::{Api, Keyspace, Workspace};
use crate::infrastructure::context::GatewayContext;
use crate::infrastructure::ratelimit::{
    InMemoryCounterStore, ManualClock, Ratelimiter, RatelimiterConfig,
};
use crate::infrastructure::storage::InMemoryDatabase;

/// Window-aligned start time for the simulated clock
pub const CLOCK_START_MS: u64 = 1_800_000_000_000;

/// A workspace with one API, a keyspace for root keys and a simulated clock
pub struct Seed {
    pub db: InMemoryDatabase,
    pub context: GatewayContext,
    pub clock: ManualClock,
    pub workspace: Workspace,
    pub api: Api,
    pub root_keyspace: Keyspace,
}

impl Seed {
    pub async fn new() -> Self {
        let db = InMemoryDatabase::new();
        let clock = ManualClock::new(CLOCK_START_MS);
        let ratelimiter = Ratelimiter::with_clock(
            Arc::new(InMemoryCounterStore::new()),
            RatelimiterConfig::default(),
            Arc::new(clock.clone()),
        );
        let context = GatewayContext::in_memory(db.clone(), Arc::new(ratelimiter));

        let workspace = Workspace::new("acme");
        let keyspace = Keyspace::new(workspace.id.clone()).with_default_prefix("sk");
        let root_keyspace = Keyspace::new(workspace.id.clone()).with_default_prefix("root");
        let api = Api::new(workspace.id.clone(), "payments", keyspace.id.clone());

        db.execute(vec![
            Mutation::InsertWorkspace(workspace.clone()),
            Mutation::InsertKeyspace(keyspace),
            Mutation::InsertKeyspace(root_keyspace.clone()),
            Mutation::InsertApi(api.clone()),
        ])
        .await
        .unwrap();

        Self {
            db,
            context,
            clock,
            workspace,
            api,
            root_keyspace,
        }
    }

    /// A root key for the workspace granted `permissions`
    pub async fn root_key(&self, permissions: &[&str]) -> (String, Key) {
        self.root_key_with(permissions, |key| key).await
    }

    pub async fn root_key_with(
        &self,
        permissions: &[&str],
        customize: impl FnOnce(Key) -> Key,
    ) -> (String, Key) {
        let generated = self.context.codec.create(Some("root"), None).unwrap();
        let key = customize(
            Key::new(
                generated.hash,
                generated.start,
                self.workspace.id.clone(),
                self.root_keyspace.id.clone(),
            )
            .for_workspace(self.workspace.id.clone()),
        );

        self.db.execute(vec![Mutation::InsertKey(key.clone())]).await.unwrap();
        self.grant(&key, permissions).await;

        (generated.key, key)
    }

    /// A data-plane key in the seeded API's keyspace
    pub async fn data_key(&self, customize: impl FnOnce(Key) -> Key) -> (String, Key) {
        let generated = self.context.codec.create(Some("sk"), None).unwrap();
        let key = customize(Key::new(
            generated.hash,
            generated.start,
            self.workspace.id.clone(),
            self.api.keyspace_id.clone(),
        ));

        self.db.execute(vec![Mutation::InsertKey(key.clone())]).await.unwrap();

        (generated.key, key)
    }

    /// Grant permissions by name, creating missing ones
    pub async fn grant(&self, key: &Key, permissions: &[&str]) {
        for name in permissions {
            let permission = match self.permission(name).await {
                Some(permission) => permission,
                None => {
                    let permission =
                        Permission::new(self.workspace.id.clone(), *name, None).unwrap();
                    self.db
                        .execute(vec![Mutation::InsertPermission(permission.clone())])
                        .await
                        .unwrap();
                    permission
                }
            };

            self.db
                .execute(vec![Mutation::InsertKeyPermission(KeyPermission {
                    key_id: key.id().clone(),
                    permission_id: permission.id,
                    workspace_id: self.workspace.id.clone(),
                })])
                .await
                .unwrap();
        }
    }

    pub async fn permission(&self, name: &str) -> Option<Permission> {
        self.context
            .rbac
            .find_permission_by_name(&self.workspace.id, name)
            .await
            .unwrap()
    }

    pub async fn update_key(&self, key: Key) {
        self.db.execute(vec![Mutation::UpdateKey(key)]).await.unwrap();
    }

    pub async fn audit_logs(&self) -> Vec<AuditLog> {
        self.context
            .audit_logs
            .list(&self.workspace.id, &AuditLogFilter::default())
            .await
            .unwrap()
    }
}
