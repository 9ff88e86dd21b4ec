//! Key infrastructure
//!
//! Key generation and hashing, and the management service for keys.

mod generator;
mod service;

pub use generator::{GeneratedKey, KeyCodec};
pub use service::{CreateKeyRequest, CreateKeyResult, KeyService};
