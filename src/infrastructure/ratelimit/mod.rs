//! Rate limiting infrastructure - Limiter and counter stores

mod factory;
mod in_memory;
mod limiter;
mod redis;

pub use factory::{create_counter_store, create_ratelimiter};
pub use in_memory::InMemoryCounterStore;
pub use limiter::{
    Clock, ManualClock, RatelimitCheck, Ratelimiter, RatelimiterConfig, SystemClock,
};
pub use self::redis::{RedisCounterStore, RedisCounterStoreConfig};
