//! Configuration loading

mod app_config;

pub use app_config::{
    AppConfig, CounterBackend, LogFormat, LoggingConfig, MetricsConfig, RatelimitSettings,
    ServerConfig, StorageBackend, StorageConfig,
};
