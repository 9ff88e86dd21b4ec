//! In-memory counter store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::ratelimit::{CounterStore, CounterUpdate, WindowKey};
use crate::domain::DomainError;

#[derive(Debug)]
struct Counter {
    value: u64,
    expires_at: Instant,
}

impl Counter {
    fn live_value(&self, now: Instant) -> u64 {
        if now >= self.expires_at { 0 } else { self.value }
    }
}

/// Strongly consistent counter store for a single process
///
/// Each window counter sits behind its own mutex, so contention is limited to callers
/// sharing an identifier and window. Expired windows are swept every `cleanup_interval`.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<WindowKey, Arc<Mutex<Counter>>>>>,
    cleanup_interval: Duration,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_cleanup_interval(Duration::from_secs(60))
    }

    pub fn with_cleanup_interval(cleanup_interval: Duration) -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            cleanup_interval,
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Number of tracked window counters, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }

    async fn counter(&self, key: &WindowKey, ttl: Duration) -> Arc<Mutex<Counter>> {
        if let Some(counter) = self.counters.read().await.get(key) {
            return Arc::clone(counter);
        }

        let mut counters = self.counters.write().await;
        Arc::clone(counters.entry(key.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(Counter {
                value: 0,
                expires_at: Instant::now() + ttl,
            }))
        }))
    }

    /// Drop counters whose TTL has elapsed
    pub async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut counters = self.counters.write().await;
        let before = counters.len();

        counters.retain(|_, counter| match counter.try_lock() {
            Ok(counter) => now < counter.expires_at,
            // In use, so not stale
            Err(_) => true,
        });

        debug!(
            removed = before - counters.len(),
            remaining = counters.len(),
            "Swept expired rate limit windows"
        );
    }

    async fn maybe_cleanup(&self) {
        let should_cleanup = {
            let last = self.last_cleanup.read().await;
            last.elapsed() >= self.cleanup_interval
        };

        if should_cleanup {
            *self.last_cleanup.write().await = Instant::now();
            self.sweep_expired().await;
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &WindowKey) -> Result<u64, DomainError> {
        let counter = self.counters.read().await.get(key).map(Arc::clone);

        match counter {
            Some(counter) => Ok(counter.lock().await.live_value(Instant::now())),
            None => Ok(0),
        }
    }

    async fn increment(
        &self,
        key: &WindowKey,
        cost: u64,
        ttl: Duration,
    ) -> Result<u64, DomainError> {
        self.maybe_cleanup().await;

        let counter = self.counter(key, ttl).await;
        let mut counter = counter.lock().await;
        let now = Instant::now();

        if now >= counter.expires_at {
            counter.value = 0;
            counter.expires_at = now + ttl;
        }

        counter.value = counter.value.saturating_add(cost);
        Ok(counter.value)
    }

    async fn try_increment(
        &self,
        key: &WindowKey,
        cost: u64,
        max: u64,
        ttl: Duration,
    ) -> Result<CounterUpdate, DomainError> {
        self.maybe_cleanup().await;

        let counter = self.counter(key, ttl).await;
        let mut counter = counter.lock().await;
        let now = Instant::now();

        if now >= counter.expires_at {
            counter.value = 0;
            counter.expires_at = now + ttl;
        }

        match counter.value.checked_add(cost) {
            Some(next) if next <= max => {
                counter.value = next;
                Ok(CounterUpdate {
                    applied: true,
                    value: next,
                })
            }
            _ => Ok(CounterUpdate {
                applied: false,
                value: counter.value,
            }),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
