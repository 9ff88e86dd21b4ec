//! Redis counter store

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::domain::ratelimit::{CounterStore, CounterUpdate, WindowKey};
use crate::domain::DomainError;

/// Conditional add: KEYS[1] counter, ARGV[1] cost, ARGV[2] max, ARGV[3] ttl in ms
const TRY_INCREMENT_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local cost = tonumber(ARGV[1])
if current + cost > tonumber(ARGV[2]) then
  return {0, current}
end
local value = redis.call('INCRBY', KEYS[1], cost)
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return {1, value}
"#;

/// Configuration for the Redis counter store
#[derive(Debug, Clone)]
pub struct RedisCounterStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl RedisCounterStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "keygate:ratelimit".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Counter store shared across gateway instances
///
/// Atomicity comes from Redis: `INCRBY`/`PEXPIRE` run in a MULTI block and the
/// conditional add runs as a Lua script.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    config: RedisCounterStoreConfig,
    try_increment: Script,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCounterStore {
    pub async fn new(config: RedisCounterStoreConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::configuration(format!("Invalid Redis URL: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            config,
            try_increment: Script::new(TRY_INCREMENT_SCRIPT),
        })
    }

    fn redis_key(&self, key: &WindowKey) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &WindowKey) -> Result<u64, DomainError> {
        let mut conn = self.connection.clone();

        let value: Option<u64> = conn.get(self.redis_key(key)).await.map_err(|e| {
            DomainError::storage(format!("Failed to read counter '{}': {}", key, e))
        })?;

        Ok(value.unwrap_or(0))
    }

    async fn increment(
        &self,
        key: &WindowKey,
        cost: u64,
        ttl: Duration,
    ) -> Result<u64, DomainError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection.clone();

        let (value,): (u64,) = redis::pipe()
            .atomic()
            .incr(&redis_key, cost)
            .pexpire(&redis_key, ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to increment counter '{}': {}", key, e))
            })?;

        Ok(value)
    }

    async fn try_increment(
        &self,
        key: &WindowKey,
        cost: u64,
        max: u64,
        ttl: Duration,
    ) -> Result<CounterUpdate, DomainError> {
        let mut conn = self.connection.clone();

        let (applied, value): (i64, u64) = self
            .try_increment
            .key(self.redis_key(key))
            .arg(cost)
            .arg(max)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to increment counter '{}': {}", key, e))
            })?;

        Ok(CounterUpdate {
            applied: applied == 1,
            value,
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
