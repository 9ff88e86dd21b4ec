//! Rate limit domain
//!
//! Configuration, per-call requests and decisions, plus the [`CounterStore`] strategy
//! the limiter is built on.

mod entity;
mod store;

pub use entity::{
    RatelimitConfig, RatelimitDecision, RatelimitMode, RatelimitRequest, DEFAULT_RATELIMIT_NAME,
};
pub use store::{CounterStore, CounterUpdate, WindowKey};

#[cfg(test)]
pub use store::MockCounterStore;
