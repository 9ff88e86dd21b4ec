use std::time::Duration;

use serde::Deserialize;

use crate::domain::ratelimit::RatelimitMode;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ratelimit: RatelimitSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Falls back to `DATABASE_URL` when unset
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatelimitSettings {
    #[serde(default)]
    pub backend: CounterBackend,
    #[serde(default)]
    pub mode: RatelimitMode,
    /// Falls back to `REDIS_URL` when unset
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_local_cache_capacity")]
    pub local_cache_capacity: u64,
}

/// Prometheus exporter; `/metrics` is only routed when enabled
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_local_cache_capacity() -> u64 {
    100_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            path: default_metrics_path(),
        }
    }
}

impl StorageConfig {
    pub fn database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

impl Default for RatelimitSettings {
    fn default() -> Self {
        Self {
            backend: CounterBackend::default(),
            mode: RatelimitMode::default(),
            redis_url: None,
            cleanup_interval_secs: default_cleanup_interval_secs(),
            local_cache_capacity: default_local_cache_capacity(),
        }
    }
}

impl RatelimitSettings {
    pub fn redis_url(&self) -> Option<String> {
        self.redis_url
            .clone()
            .or_else(|| std::env::var("REDIS_URL").ok())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.ratelimit.backend, CounterBackend::Memory);
        assert_eq!(config.ratelimit.mode, RatelimitMode::Sync);
        assert_eq!(config.ratelimit.cleanup_interval(), Duration::from_secs(60));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_layered_sources() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [storage]
                backend = "postgres"
                database_url = "postgres://localhost/keygate"

                [ratelimit]
                backend = "redis"
                mode = "async"

                [metrics]
                enabled = false
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(
            config.storage.database_url().as_deref(),
            Some("postgres://localhost/keygate")
        );
        assert_eq!(config.ratelimit.backend, CounterBackend::Redis);
        assert_eq!(config.ratelimit.mode, RatelimitMode::Async);
        assert_eq!(config.ratelimit.local_cache_capacity, 100_000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.path, "/metrics");
    }
}
