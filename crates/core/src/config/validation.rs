//! Configuration validation rules.
//!
//! Applied to `AppConfig` values after they have been loaded from
//! environment, files, or defaults.

use thiserror::Error;

use crate::config::AppConfig;
use crate::ttl::parse_ttl;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is below 100ms or above 5 minutes
    /// - `probe_timeout_ms` is 0 or above `timeout_ms`
    /// - `default_ttl` contains no recognizable duration token
    /// - `max_cache_bytes`, `max_locks`, or `stream_cache.max_keys` is 0
    /// - `user_agent` is empty
    /// - an `allowed_url_patterns` entry is not a valid regex
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.probe_timeout_ms > self.timeout_ms {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms".into(),
                reason: "must not exceed timeout_ms".into(),
            });
        }

        if parse_ttl(&self.default_ttl).is_zero() {
            return Err(ConfigError::Invalid {
                field: "default_ttl".into(),
                reason: "must contain at least one duration token, e.g. \"24h\"".into(),
            });
        }

        if self.max_cache_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_cache_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_locks == 0 {
            return Err(ConfigError::Invalid { field: "max_locks".into(), reason: "must be greater than 0".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.stream_cache.max_keys == 0 {
            return Err(ConfigError::Invalid {
                field: "stream_cache.max_keys".into(),
                reason: "must be greater than 0".into(),
            });
        }

        for pattern in &self.allowed_url_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::Invalid {
                    field: "allowed_url_patterns".into(),
                    reason: format!("'{pattern}' is not a valid regex: {e}"),
                });
            }
        }

        Ok(())
    }
}
