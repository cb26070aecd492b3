//! Upstream URL allowlist.
//!
//! The proxy only talks to hosts the scrapers are known to resolve streams
//! from. A URL passes when its host appears in the exact-host list or the
//! whole URL matches one of the configured patterns; everything else is
//! refused before a connection is attempted.

use marquee_core::{AppConfig, Error};
use regex::Regex;

/// Allowlist of exact hosts plus URL regex patterns.
#[derive(Debug, Clone)]
pub struct UrlGuard {
    hosts: Vec<String>,
    patterns: Vec<Regex>,
}

impl UrlGuard {
    /// Build a guard from host names and regex pattern strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a pattern does not compile.
    pub fn new(hosts: Vec<String>, patterns: &[String]) -> Result<Self, Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::Config(format!("invalid allowed url pattern '{p}': {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { hosts, patterns })
    }

    /// Build a guard from the application's allowlist settings.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(config.allowed_hosts.clone(), &config.allowed_url_patterns)
    }

    /// Check a URL against the allowlist.
    pub fn check(&self, url: &url::Url) -> Result<(), Error> {
        if let Some(host) = url.host_str()
            && self.hosts.iter().any(|allowed| allowed == host)
        {
            return Ok(());
        }

        if self.patterns.iter().any(|pattern| pattern.is_match(url.as_str())) {
            return Ok(());
        }

        Err(Error::UrlBlocked(url.to_string()))
    }
}
