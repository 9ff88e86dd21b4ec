//! PostgreSQL storage with connection pooling
//!
//! Entities are stored as JSONB in `data` next to the typed columns used for lookups and
//! constraints. A unit of work buffers mutations and applies them in one transaction on
//! commit, so nothing is held open while a request is still staging.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, warn};

use crate::domain::api_key::{Key, KeyRepository};
use crate::domain::audit::{AuditLog, AuditLogFilter, AuditLogRepository};
use crate::domain::id::{ApiId, KeyId, KeyspaceId, PermissionId, RoleId, WorkspaceId};
use crate::domain::rbac::{Permission, RbacRepository, Role};
use crate::domain::unit_of_work::{
    Mutation, StagedMutations, TransactionManager, UnitOfWork,
};
use crate::domain::workspace::{Api, Keyspace, Workspace, WorkspaceRepository};
use crate::domain::DomainError;

/// PostgreSQL pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/keygate".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Repositories and units of work backed by one PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_data<T: DeserializeOwned>(
        &self,
        query: &'static str,
        bind: &str,
    ) -> Result<Option<T>, DomainError> {
        sqlx::query(query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to query: {}", e)))?
            .map(|row| decode(&row))
            .transpose()
    }

    async fn fetch_all_data<T: DeserializeOwned>(
        &self,
        query: &'static str,
        bind: &str,
    ) -> Result<Vec<T>, DomainError> {
        sqlx::query(query)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to query: {}", e)))?
            .iter()
            .map(decode)
            .collect()
    }
}

fn decode<T: DeserializeOwned>(row: &PgRow) -> Result<T, DomainError> {
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|e| DomainError::storage(format!("Failed to read data column: {}", e)))?;

    serde_json::from_value(data)
        .map_err(|e| DomainError::storage(format!("Failed to deserialize entity: {}", e)))
}

fn encode<T: Serialize>(entity: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(entity)
        .map_err(|e| DomainError::storage(format!("Failed to serialize entity: {}", e)))
}

/// Unique violations surface as `Conflict`, everything else as `Storage`
fn map_write_error(what: &str, e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return DomainError::conflict(format!("{} already exists", what));
    }

    DomainError::storage(format!("Failed to write {}: {}", what, e))
}

#[async_trait]
impl TransactionManager for PostgresDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        Ok(Box::new(PostgresUnitOfWork {
            pool: self.pool.clone(),
            staged: StagedMutations::default(),
        }))
    }
}

pub struct PostgresUnitOfWork {
    pool: PgPool,
    staged: StagedMutations,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn stage(&mut self, mutation: Mutation) {
        self.staged.push(mutation);
    }

    fn staged(&self) -> &[Mutation] {
        self.staged.as_slice()
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let Self { pool, staged } = *self;
        if staged.is_empty() {
            return Ok(());
        }

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        let count = staged.len();
        for mutation in staged.into_vec() {
            let kind = mutation.kind();
            if let Err(e) = apply(&mut tx, mutation).await {
                warn!("Rolling back unit of work: failed_mutation={}, error={}", kind, e);
                // Dropping the transaction also rolls back; this surfaces rollback failures
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                return Err(e);
            }
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))?;

        debug!("Committed unit of work: mutations={}", count);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        debug!("Discarded unit of work: mutations={}", self.staged.len());
        Ok(())
    }
}

async fn apply(tx: &mut Transaction<'_, Postgres>, mutation: Mutation) -> Result<(), DomainError> {
    match mutation {
        Mutation::InsertWorkspace(ws) => {
            sqlx::query("INSERT INTO workspaces (id, data, created_at) VALUES ($1, $2, $3)")
                .bind(ws.id.as_str())
                .bind(encode(&ws)?)
                .bind(ws.created_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error("Workspace", e))?;
        }
        Mutation::InsertKeyspace(ks) => {
            sqlx::query(
                "INSERT INTO keyspaces (id, workspace_id, data, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(ks.id.as_str())
            .bind(ks.workspace_id.as_str())
            .bind(encode(&ks)?)
            .bind(ks.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("Keyspace", e))?;
        }
        Mutation::InsertApi(api) => {
            sqlx::query(
                r#"
                INSERT INTO apis (id, workspace_id, keyspace_id, deleted_at, data, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(api.id.as_str())
            .bind(api.workspace_id.as_str())
            .bind(api.keyspace_id.as_str())
            .bind(api.deleted_at)
            .bind(encode(&api)?)
            .bind(api.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("API", e))?;
        }
        Mutation::UpdateApi(api) => {
            let result = sqlx::query(
                r#"
                UPDATE apis SET deleted_at = $2, data = $3, updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(api.id.as_str())
            .bind(api.deleted_at)
            .bind(encode(&api)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("API", e))?;
            ensure_live_row_updated(result.rows_affected(), "API", api.id.as_str())?;
        }
        Mutation::InsertKey(key) => {
            sqlx::query(
                r#"
                INSERT INTO keys (id, workspace_id, keyspace_id, hash, deleted_at, data, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(key.id().as_str())
            .bind(key.workspace_id().as_str())
            .bind(key.keyspace_id().as_str())
            .bind(key.hash())
            .bind(key.deleted_at())
            .bind(encode(&key)?)
            .bind(key.created_at())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("Key", e))?;
        }
        Mutation::UpdateKey(key) => {
            // The hash is immutable, so it is matched rather than set. Soft-deleted rows
            // are frozen, which also serializes concurrent deletes of the same key.
            let result = sqlx::query(
                r#"
                UPDATE keys SET deleted_at = $3, data = $4, updated_at = NOW()
                WHERE id = $1 AND hash = $2 AND deleted_at IS NULL
                "#,
            )
            .bind(key.id().as_str())
            .bind(key.hash())
            .bind(key.deleted_at())
            .bind(encode(&key)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("Key", e))?;
            ensure_live_row_updated(result.rows_affected(), "Key", key.id().as_str())?;
        }
        Mutation::InsertPermission(permission) => {
            sqlx::query(
                r#"
                INSERT INTO permissions (id, workspace_id, name, data, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(permission.id.as_str())
            .bind(permission.workspace_id.as_str())
            .bind(&permission.name)
            .bind(encode(&permission)?)
            .bind(permission.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error(&format!("Permission '{}'", permission.name), e))?;
        }
        Mutation::InsertRole(role) => {
            sqlx::query(
                r#"
                INSERT INTO roles (id, workspace_id, name, data, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(role.id.as_str())
            .bind(role.workspace_id.as_str())
            .bind(&role.name)
            .bind(encode(&role)?)
            .bind(role.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error(&format!("Role '{}'", role.name), e))?;
        }
        Mutation::InsertKeyPermission(grant) => {
            sqlx::query(
                "INSERT INTO keys_permissions (key_id, permission_id, workspace_id) VALUES ($1, $2, $3)",
            )
            .bind(grant.key_id.as_str())
            .bind(grant.permission_id.as_str())
            .bind(grant.workspace_id.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("Key permission", e))?;
        }
        Mutation::DeleteKeyPermission(grant) => {
            sqlx::query("DELETE FROM keys_permissions WHERE key_id = $1 AND permission_id = $2")
                .bind(grant.key_id.as_str())
                .bind(grant.permission_id.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error("Key permission", e))?;
        }
        Mutation::InsertKeyRole(grant) => {
            sqlx::query("INSERT INTO keys_roles (key_id, role_id, workspace_id) VALUES ($1, $2, $3)")
                .bind(grant.key_id.as_str())
                .bind(grant.role_id.as_str())
                .bind(grant.workspace_id.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_write_error("Key role", e))?;
        }
        Mutation::InsertRolePermission(grant) => {
            sqlx::query(
                "INSERT INTO roles_permissions (role_id, permission_id, workspace_id) VALUES ($1, $2, $3)",
            )
            .bind(grant.role_id.as_str())
            .bind(grant.permission_id.as_str())
            .bind(grant.workspace_id.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("Role permission", e))?;
        }
        Mutation::InsertAuditLog(log) => {
            sqlx::query(
                r#"
                INSERT INTO audit_logs (id, workspace_id, event, actor_id, time, data)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(log.id.as_str())
            .bind(log.workspace_id.as_str())
            .bind(log.event.as_str())
            .bind(&log.actor.id)
            .bind(log.time)
            .bind(encode(&log)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_write_error("Audit log", e))?;
        }
    }

    Ok(())
}

/// An update that matched no live row lost a race with a delete, or targets nothing
fn ensure_live_row_updated(rows: u64, what: &str, id: &str) -> Result<(), DomainError> {
    if rows == 0 {
        return Err(DomainError::not_found(format!("{} '{}' not found", what, id)));
    }
    Ok(())
}

#[async_trait]
impl WorkspaceRepository for PostgresDatabase {
    async fn find_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, DomainError> {
        self.fetch_one_data("SELECT data FROM workspaces WHERE id = $1", id.as_str())
            .await
    }

    async fn find_api_including_deleted(&self, id: &ApiId) -> Result<Option<Api>, DomainError> {
        self.fetch_one_data("SELECT data FROM apis WHERE id = $1", id.as_str())
            .await
    }

    async fn find_api_by_keyspace(
        &self,
        keyspace_id: &KeyspaceId,
    ) -> Result<Option<Api>, DomainError> {
        self.fetch_one_data(
            "SELECT data FROM apis WHERE keyspace_id = $1 AND deleted_at IS NULL LIMIT 1",
            keyspace_id.as_str(),
        )
        .await
    }

    async fn find_keyspace(&self, id: &KeyspaceId) -> Result<Option<Keyspace>, DomainError> {
        self.fetch_one_data("SELECT data FROM keyspaces WHERE id = $1", id.as_str())
            .await
    }
}

#[async_trait]
impl KeyRepository for PostgresDatabase {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Key>, DomainError> {
        self.fetch_one_data("SELECT data FROM keys WHERE hash = $1", hash)
            .await
    }

    async fn find_including_deleted(&self, id: &KeyId) -> Result<Option<Key>, DomainError> {
        self.fetch_one_data("SELECT data FROM keys WHERE id = $1", id.as_str())
            .await
    }

    async fn list_by_keyspace(&self, keyspace_id: &KeyspaceId) -> Result<Vec<Key>, DomainError> {
        self.fetch_all_data(
            "SELECT data FROM keys WHERE keyspace_id = $1 AND deleted_at IS NULL ORDER BY created_at",
            keyspace_id.as_str(),
        )
        .await
    }
}

#[async_trait]
impl RbacRepository for PostgresDatabase {
    async fn find_permission(&self, id: &PermissionId) -> Result<Option<Permission>, DomainError> {
        self.fetch_one_data("SELECT data FROM permissions WHERE id = $1", id.as_str())
            .await
    }

    async fn find_permission_by_name(
        &self,
        workspace_id: &WorkspaceId,
        name: &str,
    ) -> Result<Option<Permission>, DomainError> {
        sqlx::query("SELECT data FROM permissions WHERE workspace_id = $1 AND name = $2")
            .bind(workspace_id.as_str())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to query: {}", e)))?
            .map(|row| decode(&row))
            .transpose()
    }

    async fn list_key_permissions(&self, key_id: &KeyId) -> Result<Vec<Permission>, DomainError> {
        self.fetch_all_data(
            r#"
            SELECT p.data FROM permissions p
            JOIN keys_permissions kp ON kp.permission_id = p.id
            WHERE kp.key_id = $1
            "#,
            key_id.as_str(),
        )
        .await
    }

    async fn list_key_roles(&self, key_id: &KeyId) -> Result<Vec<Role>, DomainError> {
        self.fetch_all_data(
            r#"
            SELECT r.data FROM roles r
            JOIN keys_roles kr ON kr.role_id = r.id
            WHERE kr.key_id = $1
            "#,
            key_id.as_str(),
        )
        .await
    }

    async fn list_role_permissions(&self, role_id: &RoleId) -> Result<Vec<Permission>, DomainError> {
        self.fetch_all_data(
            r#"
            SELECT p.data FROM permissions p
            JOIN roles_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            "#,
            role_id.as_str(),
        )
        .await
    }
}

#[async_trait]
impl AuditLogRepository for PostgresDatabase {
    async fn list(
        &self,
        workspace_id: &WorkspaceId,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLog>, DomainError> {
        let logs: Vec<AuditLog> = sqlx::query(
            r#"
            SELECT data FROM audit_logs
            WHERE workspace_id = $1
              AND ($2::TEXT IS NULL OR event = $2)
              AND ($3::TEXT IS NULL OR actor_id = $3)
            ORDER BY time, id
            "#,
        )
        .bind(workspace_id.as_str())
        .bind(filter.event.map(|e| e.as_str()))
        .bind(filter.actor_id.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list audit logs: {}", e)))?
        .iter()
        .map(decode)
        .collect::<Result<_, _>>()?;

        // Resources live inside the JSON document
        Ok(logs.into_iter().filter(|log| filter.matches(log)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();

        assert_eq!(config.url, "postgres://localhost/keygate");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
    }

    #[test]
    fn test_postgres_config_builder() {
        let config = PostgresConfig::new("postgres://db/test").with_max_connections(20);

        assert_eq!(config.url, "postgres://db/test");
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn test_update_of_missing_or_deleted_row_is_not_found() {
        assert!(ensure_live_row_updated(1, "Key", "key_x").is_ok());
        assert!(matches!(
            ensure_live_row_updated(0, "Key", "key_x"),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn test_map_write_error_non_unique_is_storage() {
        let err = map_write_error("Key", sqlx::Error::RowNotFound);
        assert!(matches!(err, DomainError::Storage { .. }));
    }
}
