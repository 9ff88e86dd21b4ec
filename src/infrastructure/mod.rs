//! Infrastructure layer - Storage, rate limiting, authorization and services

pub mod api_key;
pub mod audit;
pub mod authorization;
pub mod context;
pub mod logging;
pub mod observability;
pub mod ratelimit;
pub mod rbac;
pub mod storage;
pub mod workspace;

#[cfg(test)]
pub mod testing;
