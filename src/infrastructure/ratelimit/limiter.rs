//! Fixed window rate limiter
//!
//! Each limit is tracked in windows of `duration` ms starting at multiples of `duration`.
//! A request is admitted when `counter + cost <= limit` for the current window. Denied
//! requests are not charged, and a new window starts from zero.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache as MokaCache;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::ratelimit::{
    CounterStore, RatelimitConfig, RatelimitDecision, RatelimitMode, WindowKey,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_ratelimit_decision;

/// Source of the current time in Unix milliseconds
///
/// Shared by the limiter and the expiry checks so one clock drives both.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> u64;

    fn now(&self) -> DateTime<Utc> {
        millis_to_datetime(self.now_ms())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Limiter settings
#[derive(Debug, Clone)]
pub struct RatelimiterConfig {
    pub mode: RatelimitMode,
    /// Maximum number of window counters cached locally in async mode
    pub local_cache_capacity: u64,
    /// How long a local counter lives before it is re-seeded from the store
    pub local_cache_ttl: Duration,
}

impl Default for RatelimiterConfig {
    fn default() -> Self {
        Self {
            mode: RatelimitMode::Sync,
            local_cache_capacity: 100_000,
            local_cache_ttl: Duration::from_secs(60),
        }
    }
}

impl RatelimiterConfig {
    pub fn with_mode(mut self, mode: RatelimitMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One limit to check and the cost to charge when it passes
#[derive(Debug, Clone)]
pub struct RatelimitCheck {
    pub config: RatelimitConfig,
    pub cost: u64,
}

impl RatelimitCheck {
    pub fn new(config: RatelimitConfig, cost: u64) -> Self {
        Self { config, cost }
    }
}

type LocalCounters = MokaCache<WindowKey, Arc<AtomicU64>>;

enum ReconcileJob {
    Increment {
        key: WindowKey,
        cost: u64,
        ttl: Duration,
    },
    Flush(oneshot::Sender<()>),
}

/// Rate limiter over a [`CounterStore`]
///
/// In sync mode every decision is a conditional add against the store. In async mode
/// decisions are made against local counters, seeded from the store on first use, and
/// passed increments are pushed to the store by a background task that also raises the
/// local counter to the global value.
pub struct Ratelimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    mode: RatelimitMode,
    local: LocalCounters,
    reconciler: Option<mpsc::UnboundedSender<ReconcileJob>>,
}

impl fmt::Debug for Ratelimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ratelimiter")
            .field("backend", &self.store.backend())
            .field("mode", &self.mode)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Ratelimiter {
    /// Create a limiter using the system clock
    ///
    /// Async mode spawns the reconciler, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn CounterStore>, config: RatelimiterConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        config: RatelimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let local: LocalCounters = MokaCache::builder()
            .max_capacity(config.local_cache_capacity)
            .time_to_live(config.local_cache_ttl)
            .build();

        let reconciler = match config.mode {
            RatelimitMode::Sync => None,
            RatelimitMode::Async => {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_reconciler(Arc::clone(&store), local.clone(), rx));
                Some(tx)
            }
        };

        Self {
            store,
            clock,
            mode: config.mode,
            local,
            reconciler,
        }
    }

    pub fn mode(&self) -> RatelimitMode {
        self.mode
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Check a single limit for `identifier`, charging `cost` if it passes
    ///
    /// A cost of 0 always passes and writes nothing.
    pub async fn limit(
        &self,
        identifier: &str,
        config: &RatelimitConfig,
        cost: u64,
    ) -> Result<RatelimitDecision, DomainError> {
        let now = self.clock.now_ms();
        let duration = config.duration_ms();
        let window = now / duration;

        let key = WindowKey::new(
            format!("{}/{}", config.name(), duration),
            identifier,
            window,
        );
        let ttl = config.duration().saturating_mul(2);
        let reset_at = millis_to_datetime(window.saturating_add(1).saturating_mul(duration));

        let max = config.limit();

        let (passed, value) = if cost == 0 {
            (true, self.read(&key).await?)
        } else {
            match self.mode {
                RatelimitMode::Sync => {
                    let update = self.store.try_increment(&key, cost, max, ttl).await?;
                    (update.applied, update.value)
                }
                RatelimitMode::Async => self.try_increment_local(&key, cost, max, ttl).await?,
            }
        };

        if cost > 0 {
            record_ratelimit_decision(passed);
        }

        debug!(
            name = %config.name(),
            identifier = %identifier,
            passed = passed,
            cost = cost,
            value = value,
            max = max,
            "Rate limit checked"
        );

        Ok(RatelimitDecision {
            name: config.name().to_string(),
            passed,
            limit: config.limit(),
            remaining: max.saturating_sub(value),
            reset_at,
        })
    }

    /// Check limits in order, stopping at the first failure
    ///
    /// Limits after a failing one are neither evaluated nor charged. The returned
    /// decisions end with the failing one, if any.
    pub async fn limit_all(
        &self,
        identifier: &str,
        checks: &[RatelimitCheck],
    ) -> Result<Vec<RatelimitDecision>, DomainError> {
        let mut decisions = Vec::with_capacity(checks.len());

        for check in checks {
            let decision = self.limit(identifier, &check.config, check.cost).await?;
            let passed = decision.passed;
            decisions.push(decision);

            if !passed {
                break;
            }
        }

        Ok(decisions)
    }

    /// Wait until every increment queued so far has reached the store
    pub async fn flush(&self) {
        if let Some(reconciler) = &self.reconciler {
            let (tx, rx) = oneshot::channel();
            if reconciler.send(ReconcileJob::Flush(tx)).is_ok() {
                let _ = rx.await;
            }
        }
    }

    async fn read(&self, key: &WindowKey) -> Result<u64, DomainError> {
        match self.mode {
            RatelimitMode::Sync => self.store.get(key).await,
            RatelimitMode::Async => Ok(self.local_counter(key).await?.load(Ordering::Acquire)),
        }
    }

    async fn local_counter(&self, key: &WindowKey) -> Result<Arc<AtomicU64>, DomainError> {
        let store = Arc::clone(&self.store);
        let seed_key = key.clone();

        self.local
            .try_get_with(key.clone(), async move {
                let value = store.get(&seed_key).await?;
                Ok::<_, DomainError>(Arc::new(AtomicU64::new(value)))
            })
            .await
            .map_err(|e| DomainError::storage(format!("Failed to seed counter: {}", e)))
    }

    async fn try_increment_local(
        &self,
        key: &WindowKey,
        cost: u64,
        max: u64,
        ttl: Duration,
    ) -> Result<(bool, u64), DomainError> {
        let counter = self.local_counter(key).await?;

        let update = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
            value.checked_add(cost).filter(|next| *next <= max)
        });

        match update {
            Ok(previous) => {
                self.enqueue(ReconcileJob::Increment {
                    key: key.clone(),
                    cost,
                    ttl,
                });
                Ok((true, previous + cost))
            }
            Err(current) => Ok((false, current)),
        }
    }

    fn enqueue(&self, job: ReconcileJob) {
        if let Some(reconciler) = &self.reconciler
            && reconciler.send(job).is_err()
        {
            warn!("Rate limit reconciler has stopped; increment not propagated");
        }
    }
}

async fn run_reconciler(
    store: Arc<dyn CounterStore>,
    local: LocalCounters,
    mut jobs: mpsc::UnboundedReceiver<ReconcileJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            ReconcileJob::Increment { key, cost, ttl } => {
                match store.increment(&key, cost, ttl).await {
                    Ok(global) => {
                        if let Some(counter) = local.get(&key).await {
                            counter.fetch_max(global, Ordering::AcqRel);
                        }
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to reconcile rate limit counter");
                    }
                }
            }
            ReconcileJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Rate limit reconciler stopped");
}

fn millis_to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
