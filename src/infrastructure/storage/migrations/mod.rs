//! Database migrations infrastructure

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// Applies versioned migrations, recording each in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    /// Apply a migration unless already recorded; the DDL and the record share a transaction
    pub async fn run_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        let applied: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
                .bind(migration.version)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::storage(format!("Failed to check migration status: {}", e))
                })?;

        if applied {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

        info!(
            "Applied migration: version={}, description={}",
            migration.version, migration.description
        );

        Ok(())
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))
    }
}

/// A forward-only schema migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
}

/// Schema for workspaces, keys, RBAC grants and audit logs
///
/// Every entity table keeps the serialized entity in `data`; the typed columns exist for
/// lookups and constraints.
pub fn storage_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Create workspaces, keyspaces and apis",
            up: r#"
            CREATE TABLE IF NOT EXISTS workspaces (
                id VARCHAR(64) PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS keyspaces (
                id VARCHAR(64) PRIMARY KEY,
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS apis (
                id VARCHAR(64) PRIMARY KEY,
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                keyspace_id VARCHAR(64) NOT NULL REFERENCES keyspaces(id),
                deleted_at TIMESTAMPTZ,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_apis_keyspace_id ON apis(keyspace_id);
            "#,
        },
        Migration {
            version: 2,
            description: "Create keys",
            up: r#"
            CREATE TABLE IF NOT EXISTS keys (
                id VARCHAR(64) PRIMARY KEY,
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                keyspace_id VARCHAR(64) NOT NULL REFERENCES keyspaces(id),
                hash VARCHAR(64) NOT NULL UNIQUE,
                deleted_at TIMESTAMPTZ,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_keys_keyspace_id ON keys(keyspace_id);
            "#,
        },
        Migration {
            version: 3,
            description: "Create permissions, roles and grants",
            up: r#"
            CREATE TABLE IF NOT EXISTS permissions (
                id VARCHAR(64) PRIMARY KEY,
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                name VARCHAR(512) NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (workspace_id, name)
            );
            CREATE TABLE IF NOT EXISTS roles (
                id VARCHAR(64) PRIMARY KEY,
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                name VARCHAR(512) NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (workspace_id, name)
            );
            CREATE TABLE IF NOT EXISTS keys_permissions (
                key_id VARCHAR(64) NOT NULL REFERENCES keys(id),
                permission_id VARCHAR(64) NOT NULL REFERENCES permissions(id),
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                PRIMARY KEY (key_id, permission_id)
            );
            CREATE TABLE IF NOT EXISTS keys_roles (
                key_id VARCHAR(64) NOT NULL REFERENCES keys(id),
                role_id VARCHAR(64) NOT NULL REFERENCES roles(id),
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                PRIMARY KEY (key_id, role_id)
            );
            CREATE TABLE IF NOT EXISTS roles_permissions (
                role_id VARCHAR(64) NOT NULL REFERENCES roles(id),
                permission_id VARCHAR(64) NOT NULL REFERENCES permissions(id),
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                PRIMARY KEY (role_id, permission_id)
            );
            "#,
        },
        Migration {
            version: 4,
            description: "Create audit logs",
            up: r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id VARCHAR(64) PRIMARY KEY,
                workspace_id VARCHAR(64) NOT NULL REFERENCES workspaces(id),
                event VARCHAR(128) NOT NULL,
                actor_id VARCHAR(256) NOT NULL,
                time TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_logs_workspace_time
                ON audit_logs(workspace_id, time);
            "#,
        },
    ]
}

/// Runs all pending storage migrations
pub async fn run_storage_migrations(pool: &PgPool) -> Result<(), DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());

    for migration in storage_migrations() {
        migrator.run_migration(&migration).await?;
    }

    Ok(())
}
