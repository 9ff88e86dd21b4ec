//! Counter store and limiter selection from configuration

use std::sync::Arc;

use tracing::info;

use crate::config::{CounterBackend, RatelimitSettings};
use crate::domain::ratelimit::CounterStore;
use crate::domain::DomainError;

use super::in_memory::InMemoryCounterStore;
use super::limiter::{Ratelimiter, RatelimiterConfig};
use super::redis::{RedisCounterStore, RedisCounterStoreConfig};

/// Open the configured counter store
pub async fn create_counter_store(
    settings: &RatelimitSettings,
) -> Result<Arc<dyn CounterStore>, DomainError> {
    match settings.backend {
        CounterBackend::Memory => {
            info!(
                "Using in-memory rate limit counters: cleanup_interval_secs={}",
                settings.cleanup_interval_secs
            );
            Ok(Arc::new(InMemoryCounterStore::with_cleanup_interval(
                settings.cleanup_interval(),
            )))
        }
        CounterBackend::Redis => {
            let url = settings.redis_url().ok_or_else(|| {
                DomainError::configuration(
                    "ratelimit.redis_url or REDIS_URL is required for the redis backend",
                )
            })?;

            info!("Connecting to Redis for rate limit counters...");
            let store = RedisCounterStore::new(RedisCounterStoreConfig::new(url)).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the limiter; must run inside a tokio runtime when async mode is selected
pub async fn create_ratelimiter(settings: &RatelimitSettings) -> Result<Ratelimiter, DomainError> {
    let store = create_counter_store(settings).await?;
    let config = RatelimiterConfig {
        local_cache_capacity: settings.local_cache_capacity,
        ..RatelimiterConfig::default()
    }
    .with_mode(settings.mode);

    info!("Rate limiter ready: backend={}, mode={:?}", store.backend(), settings.mode);

    Ok(Ratelimiter::new(store, config))
}
