//! In-memory storage implementation

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::api_key::{Key, KeyRepository};
use crate::domain::audit::{AuditLog, AuditLogFilter, AuditLogRepository};
use crate::domain::id::{ApiId, KeyId, KeyspaceId, PermissionId, RoleId, WorkspaceId};
use crate::domain::rbac::{KeyPermission, KeyRole, Permission, RbacRepository, Role, RolePermission};
use crate::domain::unit_of_work::{
    Mutation, MutationKind, StagedMutations, TransactionManager, UnitOfWork,
};
use crate::domain::workspace::{Api, Keyspace, Workspace, WorkspaceRepository};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Tables {
    workspaces: HashMap<WorkspaceId, Workspace>,
    keyspaces: HashMap<KeyspaceId, Keyspace>,
    apis: HashMap<ApiId, Api>,
    keys: HashMap<KeyId, Key>,
    key_hashes: HashMap<String, KeyId>,
    permissions: HashMap<PermissionId, Permission>,
    roles: HashMap<RoleId, Role>,
    key_permissions: HashSet<KeyPermission>,
    key_roles: HashSet<KeyRole>,
    role_permissions: HashSet<RolePermission>,
    audit_logs: Vec<AuditLog>,
}

/// Inverse of one applied mutation
#[derive(Debug)]
enum Undo {
    Workspace(WorkspaceId),
    Keyspace(KeyspaceId),
    Api(ApiId, Option<Api>),
    Key {
        id: KeyId,
        previous: Option<Key>,
        inserted_hash: Option<String>,
    },
    Permission(PermissionId),
    Role(RoleId),
    KeyPermission(KeyPermission, bool),
    KeyRole(KeyRole, bool),
    RolePermission(RolePermission, bool),
    AuditLog,
}

impl Tables {
    /// Apply one mutation in place
    ///
    /// Every check runs before anything is written, so an error leaves the tables
    /// untouched. The returned [`Undo`] reverts a successful apply.
    fn apply(&mut self, mutation: Mutation) -> Result<Undo, DomainError> {
        let undo = match mutation {
            Mutation::InsertWorkspace(workspace) => {
                if self.workspaces.contains_key(&workspace.id) {
                    return Err(DomainError::conflict(format!(
                        "Workspace '{}' already exists",
                        workspace.id
                    )));
                }
                let id = workspace.id.clone();
                self.workspaces.insert(id.clone(), workspace);
                Undo::Workspace(id)
            }
            Mutation::InsertKeyspace(keyspace) => {
                self.require_workspace(&keyspace.workspace_id)?;
                if self.keyspaces.contains_key(&keyspace.id) {
                    return Err(DomainError::conflict(format!(
                        "Keyspace '{}' already exists",
                        keyspace.id
                    )));
                }
                let id = keyspace.id.clone();
                self.keyspaces.insert(id.clone(), keyspace);
                Undo::Keyspace(id)
            }
            Mutation::InsertApi(api) => {
                self.require_workspace(&api.workspace_id)?;
                self.require_keyspace(&api.keyspace_id)?;
                if self.apis.contains_key(&api.id) {
                    return Err(DomainError::conflict(format!(
                        "API '{}' already exists",
                        api.id
                    )));
                }
                let id = api.id.clone();
                self.apis.insert(id.clone(), api);
                Undo::Api(id, None)
            }
            Mutation::UpdateApi(api) => {
                // Soft-deleted rows are frozen
                if !self.apis.get(&api.id).is_some_and(|a| a.deleted_at.is_none()) {
                    return Err(DomainError::not_found(format!("API '{}' not found", api.id)));
                }
                let id = api.id.clone();
                let previous = self.apis.insert(id.clone(), api);
                Undo::Api(id, previous)
            }
            Mutation::InsertKey(key) => {
                self.require_keyspace(key.keyspace_id())?;
                if self.keys.contains_key(key.id()) {
                    return Err(DomainError::conflict(format!(
                        "Key '{}' already exists",
                        key.id()
                    )));
                }
                if self.key_hashes.contains_key(key.hash()) {
                    return Err(DomainError::conflict("Key hash already exists"));
                }
                let id = key.id().clone();
                let hash = key.hash().to_string();
                self.key_hashes.insert(hash.clone(), id.clone());
                self.keys.insert(id.clone(), key);
                Undo::Key {
                    id,
                    previous: None,
                    inserted_hash: Some(hash),
                }
            }
            Mutation::UpdateKey(key) => {
                let existing = self
                    .keys
                    .get(key.id())
                    .filter(|k| !k.is_deleted())
                    .ok_or_else(|| DomainError::not_found(format!("Key '{}' not found", key.id())))?;
                if existing.hash() != key.hash() {
                    return Err(DomainError::validation("Key hash cannot be changed"));
                }
                let id = key.id().clone();
                let previous = self.keys.insert(id.clone(), key);
                Undo::Key {
                    id,
                    previous,
                    inserted_hash: None,
                }
            }
            Mutation::InsertPermission(permission) => {
                let duplicate = self.permissions.values().any(|p| {
                    p.workspace_id == permission.workspace_id && p.name == permission.name
                });
                if duplicate || self.permissions.contains_key(&permission.id) {
                    return Err(DomainError::conflict(format!(
                        "Permission '{}' already exists",
                        permission.name
                    )));
                }
                let id = permission.id.clone();
                self.permissions.insert(id.clone(), permission);
                Undo::Permission(id)
            }
            Mutation::InsertRole(role) => {
                let duplicate = self
                    .roles
                    .values()
                    .any(|r| r.workspace_id == role.workspace_id && r.name == role.name);
                if duplicate || self.roles.contains_key(&role.id) {
                    return Err(DomainError::conflict(format!(
                        "Role '{}' already exists",
                        role.name
                    )));
                }
                let id = role.id.clone();
                self.roles.insert(id.clone(), role);
                Undo::Role(id)
            }
            Mutation::InsertKeyPermission(grant) => {
                self.require_key(&grant.key_id)?;
                self.require_permission(&grant.permission_id)?;
                let was_present = !self.key_permissions.insert(grant.clone());
                Undo::KeyPermission(grant, was_present)
            }
            Mutation::DeleteKeyPermission(grant) => {
                let was_present = self.key_permissions.remove(&grant);
                Undo::KeyPermission(grant, was_present)
            }
            Mutation::InsertKeyRole(grant) => {
                self.require_key(&grant.key_id)?;
                self.require_role(&grant.role_id)?;
                let was_present = !self.key_roles.insert(grant.clone());
                Undo::KeyRole(grant, was_present)
            }
            Mutation::InsertRolePermission(grant) => {
                self.require_role(&grant.role_id)?;
                self.require_permission(&grant.permission_id)?;
                let was_present = !self.role_permissions.insert(grant.clone());
                Undo::RolePermission(grant, was_present)
            }
            Mutation::InsertAuditLog(log) => {
                self.audit_logs.push(log);
                Undo::AuditLog
            }
        };

        Ok(undo)
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Workspace(id) => {
                self.workspaces.remove(&id);
            }
            Undo::Keyspace(id) => {
                self.keyspaces.remove(&id);
            }
            Undo::Api(id, previous) => restore(&mut self.apis, id, previous),
            Undo::Key {
                id,
                previous,
                inserted_hash,
            } => {
                if let Some(hash) = inserted_hash {
                    self.key_hashes.remove(&hash);
                }
                restore(&mut self.keys, id, previous);
            }
            Undo::Permission(id) => {
                self.permissions.remove(&id);
            }
            Undo::Role(id) => {
                self.roles.remove(&id);
            }
            Undo::KeyPermission(grant, was_present) => {
                restore_member(&mut self.key_permissions, grant, was_present)
            }
            Undo::KeyRole(grant, was_present) => {
                restore_member(&mut self.key_roles, grant, was_present)
            }
            Undo::RolePermission(grant, was_present) => {
                restore_member(&mut self.role_permissions, grant, was_present)
            }
            Undo::AuditLog => {
                self.audit_logs.pop();
            }
        }
    }

    fn require_workspace(&self, id: &WorkspaceId) -> Result<(), DomainError> {
        if self.workspaces.contains_key(id) {
            Ok(())
        } else {
            Err(DomainError::storage(format!("Workspace '{}' does not exist", id)))
        }
    }

    fn require_keyspace(&self, id: &KeyspaceId) -> Result<(), DomainError> {
        if self.keyspaces.contains_key(id) {
            Ok(())
        } else {
            Err(DomainError::storage(format!("Keyspace '{}' does not exist", id)))
        }
    }

    fn require_key(&self, id: &KeyId) -> Result<(), DomainError> {
        if self.keys.contains_key(id) {
            Ok(())
        } else {
            Err(DomainError::storage(format!("Key '{}' does not exist", id)))
        }
    }

    fn require_permission(&self, id: &PermissionId) -> Result<(), DomainError> {
        if self.permissions.contains_key(id) {
            Ok(())
        } else {
            Err(DomainError::storage(format!("Permission '{}' does not exist", id)))
        }
    }

    fn require_role(&self, id: &RoleId) -> Result<(), DomainError> {
        if self.roles.contains_key(id) {
            Ok(())
        } else {
            Err(DomainError::storage(format!("Role '{}' does not exist", id)))
        }
    }
}

fn restore<K: Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

fn restore_member<T: Hash + Eq>(set: &mut HashSet<T>, member: T, was_present: bool) {
    if was_present {
        set.insert(member);
    } else {
        set.remove(&member);
    }
}

/// Thread-safe in-memory database
///
/// Useful for testing and development. Data is lost when the process terminates.
/// Commits are all-or-nothing: staged mutations are applied in place under the write
/// lock, and the ones already applied are reverted if a later one fails.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<RwLock<Tables>>,
    fail_on: Arc<RwLock<Option<MutationKind>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every commit containing a mutation of `kind` fail
    pub fn fail_on(&self, kind: Option<MutationKind>) {
        if let Ok(mut fail_on) = self.fail_on.write() {
            *fail_on = kind;
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, DomainError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(f(&tables))
    }
}

#[async_trait]
impl TransactionManager for InMemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        Ok(Box::new(InMemoryUnitOfWork {
            tables: Arc::clone(&self.tables),
            fail_on: Arc::clone(&self.fail_on),
            staged: StagedMutations::default(),
        }))
    }
}

/// Unit of work over an [`InMemoryDatabase`]
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    tables: Arc<RwLock<Tables>>,
    fail_on: Arc<RwLock<Option<MutationKind>>>,
    staged: StagedMutations,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn stage(&mut self, mutation: Mutation) {
        self.staged.push(mutation);
    }

    fn staged(&self) -> &[Mutation] {
        self.staged.as_slice()
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let fail_on = self
            .fail_on
            .read()
            .map(|kind| *kind)
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut tables = self
            .tables
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))?;

        let count = self.staged.len();
        let mut applied = Vec::with_capacity(count);

        for mutation in self.staged.into_vec() {
            let kind = mutation.kind();
            let result = if fail_on == Some(kind) {
                Err(DomainError::storage(format!("Injected failure on {}", kind)))
            } else {
                tables.apply(mutation)
            };

            match result {
                Ok(undo) => applied.push(undo),
                Err(e) => {
                    for undo in applied.into_iter().rev() {
                        tables.revert(undo);
                    }
                    return Err(e);
                }
            }
        }

        debug!(mutations = count, "Committed unit of work");

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        debug!(mutations = self.staged.len(), "Rolled back unit of work");
        Ok(())
    }
}

#[async_trait]
impl WorkspaceRepository for InMemoryDatabase {
    async fn find_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, DomainError> {
        self.read(|t| t.workspaces.get(id).cloned())
    }

    async fn find_api_including_deleted(&self, id: &ApiId) -> Result<Option<Api>, DomainError> {
        self.read(|t| t.apis.get(id).cloned())
    }

    async fn find_api_by_keyspace(
        &self,
        keyspace_id: &KeyspaceId,
    ) -> Result<Option<Api>, DomainError> {
        self.read(|t| {
            t.apis
                .values()
                .find(|api| api.keyspace_id == *keyspace_id)
                .cloned()
        })
    }

    async fn find_keyspace(&self, id: &KeyspaceId) -> Result<Option<Keyspace>, DomainError> {
        self.read(|t| t.keyspaces.get(id).cloned())
    }
}

#[async_trait]
impl KeyRepository for InMemoryDatabase {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Key>, DomainError> {
        self.read(|t| t.key_hashes.get(hash).and_then(|id| t.keys.get(id)).cloned())
    }

    async fn find_including_deleted(&self, id: &KeyId) -> Result<Option<Key>, DomainError> {
        self.read(|t| t.keys.get(id).cloned())
    }

    async fn list_by_keyspace(&self, keyspace_id: &KeyspaceId) -> Result<Vec<Key>, DomainError> {
        self.read(|t| {
            let mut keys: Vec<Key> = t
                .keys
                .values()
                .filter(|k| k.keyspace_id() == keyspace_id && !k.is_deleted())
                .cloned()
                .collect();
            keys.sort_by_key(|k| k.created_at());
            keys
        })
    }
}

#[async_trait]
impl RbacRepository for InMemoryDatabase {
    async fn find_permission(&self, id: &PermissionId) -> Result<Option<Permission>, DomainError> {
        self.read(|t| t.permissions.get(id).cloned())
    }

    async fn find_permission_by_name(
        &self,
        workspace_id: &WorkspaceId,
        name: &str,
    ) -> Result<Option<Permission>, DomainError> {
        self.read(|t| {
            t.permissions
                .values()
                .find(|p| p.workspace_id == *workspace_id && p.name == name)
                .cloned()
        })
    }

    async fn list_key_permissions(&self, key_id: &KeyId) -> Result<Vec<Permission>, DomainError> {
        self.read(|t| {
            t.key_permissions
                .iter()
                .filter(|grant| grant.key_id == *key_id)
                .filter_map(|grant| t.permissions.get(&grant.permission_id).cloned())
                .collect()
        })
    }

    async fn list_key_roles(&self, key_id: &KeyId) -> Result<Vec<Role>, DomainError> {
        self.read(|t| {
            t.key_roles
                .iter()
                .filter(|grant| grant.key_id == *key_id)
                .filter_map(|grant| t.roles.get(&grant.role_id).cloned())
                .collect()
        })
    }

    async fn list_role_permissions(&self, role_id: &RoleId) -> Result<Vec<Permission>, DomainError> {
        self.read(|t| {
            t.role_permissions
                .iter()
                .filter(|grant| grant.role_id == *role_id)
                .filter_map(|grant| t.permissions.get(&grant.permission_id).cloned())
                .collect()
        })
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryDatabase {
    async fn list(
        &self,
        workspace_id: &WorkspaceId,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLog>, DomainError> {
        self.read(|t| {
            t.audit_logs
                .iter()
                .filter(|log| log.workspace_id == *workspace_id && filter.matches(log))
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::domain::audit::{AuditActor, AuditContext, AuditEvent, AuditLogEntry};

    struct Fixture {
        db: InMemoryDatabase,
        workspace: Workspace,
        api: Api,
    }

    async fn fixture() -> Fixture {
        let db = InMemoryDatabase::new();
        let workspace = Workspace::new("acme");
        let keyspace = Keyspace::new(workspace.id.clone());
        let api = Api::new(workspace.id.clone(), "payments", keyspace.id.clone());

        db.execute(vec![
            Mutation::InsertWorkspace(workspace.clone()),
            Mutation::InsertKeyspace(keyspace),
            Mutation::InsertApi(api.clone()),
        ])
        .await
        .unwrap();

        Fixture { db, workspace, api }
    }

    fn key_for(f: &Fixture, hash: &str) -> Key {
        Key::new(hash, "sk_abcd", f.workspace.id.clone(), f.api.keyspace_id.clone())
    }

    fn audit_row(workspace_id: &WorkspaceId) -> AuditLog {
        AuditLog::from_entry(
            AuditLogEntry {
                workspace_id: workspace_id.clone(),
                event: AuditEvent::KeyCreate,
                actor: AuditActor::system("test"),
                description: "Created key".into(),
                resources: vec![],
                context: AuditContext::default(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_find_by_hash_and_soft_delete() {
        let f = fixture().await;
        let mut key = key_for(&f, "hash-1");
        f.db.execute(vec![Mutation::InsertKey(key.clone())]).await.unwrap();

        assert_eq!(f.db.find_by_hash("hash-1").await.unwrap(), Some(key.clone()));
        assert!(f.db.find(key.id()).await.unwrap().is_some());

        key.soft_delete();
        f.db.execute(vec![Mutation::UpdateKey(key.clone())]).await.unwrap();

        assert!(f.db.find(key.id()).await.unwrap().is_none());
        assert!(f.db.find_including_deleted(key.id()).await.unwrap().is_some());
        assert!(f.db.find_by_hash("hash-1").await.unwrap().unwrap().is_deleted());
        assert!(f.db.list_by_keyspace(&f.api.keyspace_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_soft_delete_is_rejected() {
        let f = fixture().await;
        let key = key_for(&f, "hash-1");
        f.db.execute(vec![Mutation::InsertKey(key.clone())]).await.unwrap();

        // Two deletes that both read the live row
        let mut first = key.clone();
        first.soft_delete();
        let mut second = key.clone();
        second.soft_delete();

        f.db.execute(vec![
            Mutation::UpdateKey(first.clone()),
            Mutation::InsertAuditLog(audit_row(&f.workspace.id)),
        ])
        .await
        .unwrap();

        let result = f
            .db
            .execute(vec![
                Mutation::UpdateKey(second),
                Mutation::InsertAuditLog(audit_row(&f.workspace.id)),
            ])
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));

        let stored = f.db.find_including_deleted(key.id()).await.unwrap().unwrap();
        assert_eq!(stored.deleted_at(), first.deleted_at());
        assert_eq!(
            f.db.list(&f.workspace.id, &AuditLogFilter::default()).await.unwrap().len(),
            1
        );

        let mut api = f.api.clone();
        api.soft_delete();
        f.db.execute(vec![Mutation::UpdateApi(api.clone())]).await.unwrap();
        let result = f.db.execute(vec![Mutation::UpdateApi(api)]).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_hash_conflicts() {
        let f = fixture().await;
        f.db.execute(vec![Mutation::InsertKey(key_for(&f, "same"))]).await.unwrap();

        let result = f.db.execute(vec![Mutation::InsertKey(key_for(&f, "same"))]).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_permission_name_conflicts() {
        let f = fixture().await;
        let ws = f.workspace.id.clone();
        let first = Permission::new(ws.clone(), "domain.create", None).unwrap();
        let second = Permission::new(ws, "domain.create", None).unwrap();

        f.db.execute(vec![Mutation::InsertPermission(first)]).await.unwrap();
        let result = f.db.execute(vec![Mutation::InsertPermission(second)]).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let f = fixture().await;
        let key = key_for(&f, "hash-2");

        f.db.fail_on(Some(MutationKind::InsertAuditLog));
        let result = f
            .db
            .execute(vec![
                Mutation::InsertKey(key.clone()),
                Mutation::InsertAuditLog(audit_row(&f.workspace.id)),
            ])
            .await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert!(f.db.find_by_hash("hash-2").await.unwrap().is_none());
        assert!(f
            .db
            .list(&f.workspace.id, &AuditLogFilter::default())
            .await
            .unwrap()
            .is_empty());

        f.db.fail_on(None);
        f.db.execute(vec![
            Mutation::InsertKey(key),
            Mutation::InsertAuditLog(audit_row(&f.workspace.id)),
        ])
        .await
        .unwrap();
        assert!(f.db.find_by_hash("hash-2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_reverts_updates_and_removals() {
        let f = fixture().await;
        let key = key_for(&f, "hash-5");
        let permission = Permission::new(f.workspace.id.clone(), "domain.read", None).unwrap();
        let grant = KeyPermission {
            key_id: key.id().clone(),
            permission_id: permission.id.clone(),
            workspace_id: f.workspace.id.clone(),
        };
        f.db.execute(vec![
            Mutation::InsertKey(key.clone()),
            Mutation::InsertPermission(permission),
            Mutation::InsertKeyPermission(grant.clone()),
            Mutation::InsertAuditLog(audit_row(&f.workspace.id)),
        ])
        .await
        .unwrap();

        let mut deleted = key.clone();
        deleted.soft_delete();
        let result = f
            .db
            .execute(vec![
                Mutation::DeleteKeyPermission(grant),
                Mutation::UpdateKey(deleted),
                Mutation::InsertKey(key_for(&f, "hash-6")),
                Mutation::InsertAuditLog(audit_row(&f.workspace.id)),
                // Conflicts with the key inserted above
                Mutation::InsertKey(key_for(&f, "hash-6")),
            ])
            .await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(f.db.find(key.id()).await.unwrap(), Some(key.clone()));
        assert_eq!(f.db.granted_permissions(key.id()).await.unwrap().sorted(), vec!["domain.read"]);
        assert!(f.db.find_by_hash("hash-6").await.unwrap().is_none());
        assert_eq!(
            f.db.list(&f.workspace.id, &AuditLogFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard() {
        let f = fixture().await;

        let mut uow = f.db.begin().await.unwrap();
        uow.stage(Mutation::InsertKey(key_for(&f, "hash-3")));
        assert_eq!(uow.staged().len(), 1);
        uow.rollback().await.unwrap();

        {
            let mut uow = f.db.begin().await.unwrap();
            uow.stage(Mutation::InsertKey(key_for(&f, "hash-4")));
        }

        assert!(f.db.find_by_hash("hash-3").await.unwrap().is_none());
        assert!(f.db.find_by_hash("hash-4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_granted_permissions_union_roles() {
        let f = fixture().await;
        let ws = f.workspace.id.clone();
        let key = key_for(&f, "hash-5");
        let direct = Permission::new(ws.clone(), "api.*.read_key", None).unwrap();
        let via_role = Permission::new(ws.clone(), "api.*.delete_key", None).unwrap();
        let role = Role::new(ws.clone(), "admin");

        f.db.execute(vec![
            Mutation::InsertKey(key.clone()),
            Mutation::InsertPermission(direct.clone()),
            Mutation::InsertPermission(via_role.clone()),
            Mutation::InsertRole(role.clone()),
            Mutation::InsertKeyPermission(KeyPermission {
                key_id: key.id().clone(),
                permission_id: direct.id.clone(),
                workspace_id: ws.clone(),
            }),
            Mutation::InsertKeyRole(KeyRole {
                key_id: key.id().clone(),
                role_id: role.id.clone(),
                workspace_id: ws.clone(),
            }),
            Mutation::InsertRolePermission(RolePermission {
                role_id: role.id.clone(),
                permission_id: via_role.id.clone(),
                workspace_id: ws,
            }),
        ])
        .await
        .unwrap();

        let granted = f.db.granted_permissions(key.id()).await.unwrap();
        assert_eq!(granted.sorted(), vec!["api.*.delete_key", "api.*.read_key"]);
    }

    #[tokio::test]
    async fn test_api_lookup_by_keyspace() {
        let f = fixture().await;

        let api = f.db.find_api_by_keyspace(&f.api.keyspace_id).await.unwrap();
        assert_eq!(api.map(|a| a.id), Some(f.api.id.clone()));

        let mut deleted = f.api.clone();
        deleted.soft_delete();
        f.db.execute(vec![Mutation::UpdateApi(deleted)]).await.unwrap();

        assert!(f.db.find_api(&f.api.id).await.unwrap().is_none());
        assert!(f.db.find_api_including_deleted(&f.api.id).await.unwrap().is_some());
    }
}
