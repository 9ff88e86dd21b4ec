//! Storage factory for runtime backend selection

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::api_key::KeyRepository;
use crate::domain::audit::AuditLogRepository;
use crate::domain::rbac::RbacRepository;
use crate::domain::unit_of_work::TransactionManager;
use crate::domain::workspace::WorkspaceRepository;
use crate::domain::DomainError;

use super::in_memory::InMemoryDatabase;
use super::migrations::run_storage_migrations;
use super::postgres::{PostgresConfig, PostgresDatabase};

/// Every repository over one backend
#[derive(Debug, Clone)]
pub struct StorageHandles {
    pub keys: Arc<dyn KeyRepository>,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub rbac: Arc<dyn RbacRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
    pub transactions: Arc<dyn TransactionManager>,
}

impl StorageHandles {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: KeyRepository
            + WorkspaceRepository
            + RbacRepository
            + AuditLogRepository
            + TransactionManager
            + 'static,
    {
        Self {
            keys: backend.clone(),
            workspaces: backend.clone(),
            rbac: backend.clone(),
            audit_logs: backend.clone(),
            transactions: backend,
        }
    }
}

/// Factory for creating storage instances
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Open the configured backend; PostgreSQL is migrated before use
    pub async fn create(config: &StorageConfig) -> Result<StorageHandles, DomainError> {
        match config.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Ok(StorageHandles::from_backend(Arc::new(InMemoryDatabase::new())))
            }
            StorageBackend::Postgres => {
                let url = config.database_url().ok_or_else(|| {
                    DomainError::configuration(
                        "storage.database_url or DATABASE_URL is required for the postgres backend",
                    )
                })?;

                info!("Connecting to PostgreSQL...");
                let db = PostgresDatabase::connect(
                    &PostgresConfig::new(url).with_max_connections(config.max_connections),
                )
                .await?;
                run_storage_migrations(db.pool()).await?;
                info!("PostgreSQL storage ready");

                Ok(StorageHandles::from_backend(Arc::new(db)))
            }
        }
    }
}
