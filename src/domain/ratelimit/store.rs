//! Counter store abstraction for rate limiting

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Identifies one counter: a named limit, the identifier it applies to and the window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub namespace: String,
    pub identifier: String,
    /// Window sequence number (`now_ms / duration_ms`)
    pub window: u64,
}

impl WindowKey {
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>, window: u64) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
            window,
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.identifier, self.window)
    }
}

/// Result of a conditional increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    /// Whether the cost was added
    pub applied: bool,
    /// Counter value after the operation
    pub value: u64,
}

/// Atomically incrementable window counters
///
/// Implementations must never decrease a counter inside its window. Keys may expire once
/// `ttl` has passed, which is how windows roll over.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, 0 when the counter does not exist
    async fn get(&self, key: &WindowKey) -> Result<u64, DomainError>;

    /// Unconditionally add `cost`, returning the new value
    async fn increment(&self, key: &WindowKey, cost: u64, ttl: Duration)
        -> Result<u64, DomainError>;

    /// Add `cost` only if the result stays at or below `max`
    async fn try_increment(
        &self,
        key: &WindowKey,
        cost: u64,
        max: u64,
        ttl: Duration,
    ) -> Result<CounterUpdate, DomainError>;

    /// Short backend name for logs and metrics
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_display() {
        let key = WindowKey::new("requests", "key_abc", 42);
        assert_eq!(key.to_string(), "requests:key_abc:42");
    }
}
