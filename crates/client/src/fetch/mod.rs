//! HTTP fetch and probe pipeline.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Allowlist Gate
//! - When configured, only allowlisted hosts/patterns are contacted.
//!
//! ### Streaming
//! - Fetched bodies are exposed as chunk streams, never buffered whole.

pub mod guard;
pub mod url;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use marquee_core::{AppConfig, Error, Fetch, FetchedResponse, Probe};
use reqwest::{Client, header};

pub use guard::UrlGuard;
pub use url::{UrlError, canonicalize};

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// User agent string (default: "marquee/0.1")
    pub user_agent: String,

    /// Full-fetch timeout (default: 20s)
    pub timeout: Duration,

    /// Existence-probe timeout (default: 5s)
    pub probe_timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "marquee/0.1".to_string(),
            timeout: Duration::from_millis(20_000),
            probe_timeout: Duration::from_millis(5_000),
            max_redirects: 5,
        }
    }
}

impl HttpClientConfig {
    /// Derive the client configuration from application settings.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            probe_timeout: config.probe_timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// HTTP client implementing the cache core's fetch and probe capabilities.
pub struct HttpClient {
    http: Client,
    config: HttpClientConfig,
    guard: Option<UrlGuard>,
}

impl HttpClient {
    /// Create a new client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config, guard: None })
    }

    /// Create a client from application settings, wiring up the URL
    /// allowlist when one is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut client = Self::new(HttpClientConfig::from_app(config))?;

        if !config.allowed_hosts.is_empty() || !config.allowed_url_patterns.is_empty() {
            client = client.with_guard(UrlGuard::from_config(config)?);
        }

        Ok(client)
    }

    /// Attach an allowlist; URLs failing it are refused before any request.
    pub fn with_guard(mut self, guard: UrlGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn gate(&self, url: &::url::Url) -> Result<(), Error> {
        if let Some(guard) = &self.guard {
            guard.check(url)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn fetch(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<FetchedResponse, Error> {
        let target = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.gate(&target)?;

        let response = self
            .http
            .get(target.clone())
            .headers(to_header_map(headers))
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("network error: {e}")))?;

        let status = response.status().as_u16();
        let response_headers = from_header_map(response.headers());

        tracing::debug!(url = %target, final_url = %response.url(), status, "fetched upstream");

        let body = response
            .bytes_stream()
            .map_err(|e| Error::Fetch(format!("failed to read response: {e}")))
            .boxed();

        Ok(FetchedResponse { status, headers: response_headers, body })
    }
}

#[async_trait]
impl Probe for HttpClient {
    async fn probe(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<u16, Error> {
        let target = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.gate(&target)?;

        let response = self
            .http
            .head(target.clone())
            .headers(to_header_map(headers))
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("probe failed: {e}")))?;

        let status = response.status().as_u16();
        tracing::debug!(url = %target, status, "probed upstream");

        Ok(status)
    }
}

/// Build a reqwest header map, skipping entries that are not valid HTTP
/// header names or values.
fn to_header_map(headers: &BTreeMap<String, String>) -> header::HeaderMap {
    let mut map = header::HeaderMap::new();

    for (name, value) in headers {
        let Ok(name) = header::HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "skipping invalid header name");
            continue;
        };
        let Ok(value) = header::HeaderValue::from_str(value) else {
            tracing::warn!(header = %name, "skipping invalid header value");
            continue;
        };
        map.insert(name, value);
    }

    map
}

/// Flatten response headers into the plain map the cache persists,
/// dropping values that are not valid UTF-8.
fn from_header_map(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpClientConfig::default();
        assert_eq!(config.user_agent, "marquee/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20_000));
        assert_eq!(config.probe_timeout, Duration::from_millis(5_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_config_from_app() {
        let app = AppConfig { timeout_ms: 1_000, probe_timeout_ms: 500, ..Default::default() };
        let config = HttpClientConfig::from_app(&app);
        assert_eq!(config.timeout, Duration::from_millis(1_000));
        assert_eq!(config.probe_timeout, Duration::from_millis(500));
        assert_eq!(config.user_agent, app.user_agent);
    }

    #[tokio::test]
    async fn test_client_new() {
        let client = HttpClient::new(HttpClientConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_guarded_fetch_refuses_unknown_host() {
        let guard = UrlGuard::new(vec!["streamhost.example".to_string()], &[]).unwrap();
        let client = HttpClient::new(HttpClientConfig::default())
            .unwrap()
            .with_guard(guard);

        let result = client.fetch("https://evil.example/v.mp4", &BTreeMap::new()).await;
        assert!(matches!(result, Err(Error::UrlBlocked(_))));

        let result = client.probe("https://evil.example/v.mp4", &BTreeMap::new()).await;
        assert!(matches!(result, Err(Error::UrlBlocked(_))));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let result = client.fetch("", &BTreeMap::new()).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_header_map_round_trip() {
        let mut headers = BTreeMap::new();
        headers.insert("referer".to_string(), "https://streamhost.example".to_string());
        headers.insert("x-custom".to_string(), "1".to_string());

        let map = to_header_map(&headers);
        assert_eq!(map.len(), 2);

        let back = from_header_map(&map);
        assert_eq!(back, headers);
    }

    #[test]
    fn test_header_map_skips_invalid() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header name".to_string(), "v".to_string());
        headers.insert("ok".to_string(), "v".to_string());

        let map = to_header_map(&headers);
        assert_eq!(map.len(), 1);
    }
}
