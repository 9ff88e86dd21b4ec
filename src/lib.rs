//! Keygate
//!
//! API key verification and authorization gateway:
//! - Key issuance with hashed storage and one-time plaintext
//! - Permission queries over direct and role-derived grants
//! - Fixed-window rate limits over in-memory or Redis counters
//! - Root-key management plane with an audit row per mutation

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use api::state::AppState;
use infrastructure::context::GatewayContext;
use tracing::info;

/// Create the application state from the configured backends
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    info!(
        "Initializing gateway: storage={:?}, counters={:?}, mode={:?}",
        config.storage.backend, config.ratelimit.backend, config.ratelimit.mode
    );

    let context = GatewayContext::from_config(config).await?;

    Ok(AppState::new(context))
}
