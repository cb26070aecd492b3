//! Application configuration with layered loading.
//!
//! Configuration is assembled with figment from three sources:
//!
//! 1. Environment variables (MARQUEE_*)
//! 2. TOML config file (if MARQUEE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::streams::StreamCacheConfig;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MARQUEE_*)
/// 2. TOML config file (if MARQUEE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite cache metadata database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding cached response bodies.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Size cap for the body store; the maintenance sweep trims down to it.
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: u64,

    /// TTL string applied to entries created without an explicit TTL.
    #[serde(default = "default_ttl")]
    pub default_ttl: String,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Existence-probe timeout in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum redirects followed by fetches and probes.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Maximum number of keys tracked by the keyed lock manager.
    #[serde(default = "default_max_locks")]
    pub max_locks: usize,

    /// Hostnames upstream requests may target.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Regex patterns for upstream URLs outside `allowed_hosts`.
    #[serde(default)]
    pub allowed_url_patterns: Vec<String>,

    /// Stream validity cache tunables.
    #[serde(default)]
    pub stream_cache: StreamCacheConfig,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./marquee.sqlite3")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_max_cache_bytes() -> u64 {
    200 * 1024 * 1024
}

fn default_ttl() -> String {
    "24h".into()
}

fn default_user_agent() -> String {
    "marquee/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_locks() -> usize {
    255
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            max_cache_bytes: default_max_cache_bytes(),
            default_ttl: default_ttl(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_locks: default_max_locks(),
            allowed_hosts: Vec::new(),
            allowed_url_patterns: Vec::new(),
            stream_cache: StreamCacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Upstream timeout as a Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MARQUEE_`
    /// 2. TOML file from `MARQUEE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or validation
    /// fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MARQUEE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MARQUEE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
