//! Rate limit configuration and decision types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Name used for the limit created through the legacy single-ratelimit field
pub const DEFAULT_RATELIMIT_NAME: &str = "default";

/// A named limit of `limit` cost units per `duration_ms` window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRatelimitConfig")]
pub struct RatelimitConfig {
    name: String,
    limit: u64,
    duration_ms: u64,
}

#[derive(Deserialize)]
struct RawRatelimitConfig {
    name: String,
    limit: u64,
    duration_ms: u64,
}

impl TryFrom<RawRatelimitConfig> for RatelimitConfig {
    type Error = DomainError;

    fn try_from(raw: RawRatelimitConfig) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.limit, raw.duration_ms)
    }
}

impl RatelimitConfig {
    /// Create a validated configuration; both `limit` and `duration_ms` must be positive
    pub fn new(name: impl Into<String>, limit: u64, duration_ms: u64) -> Result<Self, DomainError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(DomainError::validation("Ratelimit name cannot be empty"));
        }

        if limit == 0 {
            return Err(DomainError::validation(format!(
                "Ratelimit '{}' must have a limit greater than 0",
                name
            )));
        }

        if duration_ms == 0 {
            return Err(DomainError::validation(format!(
                "Ratelimit '{}' must have a duration greater than 0",
                name
            )));
        }

        Ok(Self {
            name,
            limit,
            duration_ms,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Caller-supplied rate limit check made during verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatelimitRequest {
    pub name: String,
    /// Units charged on success; 0 performs a dry run
    #[serde(default = "default_cost")]
    pub cost: u64,
    /// Inline limit, used together with `duration` instead of a key-attached config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

fn default_cost() -> u64 {
    1
}

impl RatelimitRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cost: default_cost(),
            limit: None,
            duration: None,
        }
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Attach an inline limit so no key-attached config is needed
    pub fn with_inline_limit(mut self, limit: u64, duration_ms: u64) -> Self {
        self.limit = Some(limit);
        self.duration = Some(duration_ms);
        self
    }

    /// The inline configuration, if both limit and duration were provided
    pub fn inline_config(&self) -> Result<Option<RatelimitConfig>, DomainError> {
        match (self.limit, self.duration) {
            (Some(limit), Some(duration)) => {
                RatelimitConfig::new(self.name.clone(), limit, duration).map(Some)
            }
            (None, None) => Ok(None),
            _ => Err(DomainError::validation(format!(
                "Ratelimit '{}' must specify both limit and duration, or neither",
                self.name
            ))),
        }
    }
}

/// How counter writes are accounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatelimitMode {
    /// Block on a durable counter write; exact
    #[default]
    Sync,
    /// Decide on a local counter and reconcile in the background; may overrun
    Async,
}

/// Outcome of checking a single limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatelimitDecision {
    pub name: String,
    pub passed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_zero() {
        assert!(RatelimitConfig::new("a", 0, 1000).is_err());
        assert!(RatelimitConfig::new("a", 10, 0).is_err());
        assert!(RatelimitConfig::new(" ", 10, 1000).is_err());
        assert!(RatelimitConfig::new("a", 10, 1000).is_ok());
    }

    #[test]
    fn test_config_deserialize_validates() {
        let ok: RatelimitConfig =
            serde_json::from_str(r#"{"name":"requests","limit":5,"duration_ms":1000}"#).unwrap();
        assert_eq!(ok.limit(), 5);
        assert_eq!(ok.duration(), Duration::from_secs(1));

        let bad: Result<RatelimitConfig, _> =
            serde_json::from_str(r#"{"name":"requests","limit":0,"duration_ms":1000}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_request_defaults_cost_to_one() {
        let req: RatelimitRequest = serde_json::from_str(r#"{"name":"tokens"}"#).unwrap();
        assert_eq!(req.cost, 1);
        assert!(req.inline_config().unwrap().is_none());
    }

    #[test]
    fn test_request_inline_config() {
        let req = RatelimitRequest::named("burst").with_inline_limit(3, 500);
        let config = req.inline_config().unwrap().unwrap();
        assert_eq!(config.name(), "burst");
        assert_eq!(config.limit(), 3);

        let partial = RatelimitRequest {
            limit: Some(3),
            ..RatelimitRequest::named("burst")
        };
        assert!(partial.inline_config().is_err());
    }
}
