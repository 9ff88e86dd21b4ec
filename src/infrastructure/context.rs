//! Shared handles passed to services

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::api_key::KeyRepository;
use crate::domain::audit::AuditLogRepository;
use crate::domain::rbac::RbacRepository;
use crate::domain::unit_of_work::TransactionManager;
use crate::domain::workspace::WorkspaceRepository;
use crate::domain::DomainError;
use crate::infrastructure::api_key::KeyCodec;
use crate::infrastructure::audit::AuditLogWriter;
use crate::infrastructure::ratelimit::{
    create_ratelimiter, Clock, InMemoryCounterStore, Ratelimiter, RatelimiterConfig,
};
use crate::infrastructure::storage::{InMemoryDatabase, StorageFactory, StorageHandles};

/// Storage, limiter and codec handles shared by the authorization pipeline and services
#[derive(Debug, Clone)]
pub struct GatewayContext {
    pub keys: Arc<dyn KeyRepository>,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub rbac: Arc<dyn RbacRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
    pub transactions: Arc<dyn TransactionManager>,
    pub ratelimiter: Arc<Ratelimiter>,
    /// The limiter's clock, also used for expiry checks
    pub clock: Arc<dyn Clock>,
    pub codec: KeyCodec,
    pub audit: AuditLogWriter,
}

impl GatewayContext {
    pub fn new(storage: StorageHandles, ratelimiter: Arc<Ratelimiter>) -> Self {
        Self {
            keys: storage.keys,
            workspaces: storage.workspaces,
            rbac: storage.rbac,
            audit_logs: storage.audit_logs,
            transactions: storage.transactions,
            clock: ratelimiter.clock(),
            ratelimiter,
            codec: KeyCodec::new(),
            audit: AuditLogWriter::new(),
        }
    }

    /// Open the configured storage and counter backends
    pub async fn from_config(config: &AppConfig) -> Result<Self, DomainError> {
        let storage = StorageFactory::create(&config.storage).await?;
        let ratelimiter = create_ratelimiter(&config.ratelimit).await?;

        Ok(Self::new(storage, Arc::new(ratelimiter)))
    }

    /// Wire every repository to one in-memory database
    pub fn in_memory(db: InMemoryDatabase, ratelimiter: Arc<Ratelimiter>) -> Self {
        Self::new(StorageHandles::from_backend(Arc::new(db)), ratelimiter)
    }

    /// In-memory database with a synchronous in-memory limiter
    pub fn in_memory_default(db: InMemoryDatabase) -> Self {
        let ratelimiter = Ratelimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RatelimiterConfig::default(),
        );
        Self::in_memory(db, Arc::new(ratelimiter))
    }
}
