//! In-memory stream validity cache.
//!
//! Scraped stream links die silently: upstream hosts expire signed URLs or
//! drop files without notice. This cache keeps previously resolved stream
//! descriptors per media key and, on every lookup, concurrently probes each
//! one against its origin, evicting sources that fail or are about to
//! expire. Callers only re-scrape the sources reported invalid.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::Error;
use crate::fetch::Probe;

/// An opaque playable-stream description as produced by a scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub url: String,

    /// Headers a player must send to the origin.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub title: String,

    /// Tag of the scraper/origin that produced this descriptor; used to
    /// batch-invalidate everything from a failing origin.
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub not_web_ready: bool,

    /// Declared time-to-live in seconds. Takes precedence over a pre-set
    /// `expiry` when both are present.
    #[serde(default)]
    pub ttl_secs: Option<i64>,

    /// Pre-set absolute expiry (unix seconds), e.g. parsed from a signed
    /// URL's `expires` parameter.
    #[serde(default)]
    pub expiry: Option<i64>,

    /// Expected playback duration in seconds, when known.
    #[serde(default)]
    pub duration_secs: Option<i64>,
}

/// A stored descriptor with its computed absolute expiry.
#[derive(Debug, Clone)]
struct CachedStream {
    descriptor: StreamDescriptor,
    expires_at: i64,
}

/// Tunables for the stream validity cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamCacheConfig {
    /// Master switch; a disabled cache returns nothing and stores nothing.
    pub enabled: bool,

    /// Maximum number of distinct media keys kept.
    pub max_keys: usize,

    /// Lookahead added to "now" when deciding a stream is too close to
    /// expiry to serve.
    pub safety_margin_secs: i64,

    /// Margin subtracted from expiry in the mid-playback check
    /// (`expiry - margin < now + duration`).
    pub expiry_margin_secs: i64,

    /// Expiry applied when a descriptor declares neither a TTL nor an
    /// absolute expiry.
    pub default_ttl_secs: i64,

    /// Source tags never cached.
    pub blocked_sources: Vec<String>,
}

impl Default for StreamCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_keys: 1024,
            safety_margin_secs: 600,
            expiry_margin_secs: 300,
            default_ttl_secs: 3600,
            blocked_sources: vec!["static_sources".to_string()],
        }
    }
}

struct Shelf {
    entries: HashMap<String, Vec<CachedStream>>,
    // Access order, least recently used at the front.
    order: VecDeque<String>,
}

impl Shelf {
    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
    }
}

/// Size-bounded per-media cache of validated stream descriptors.
///
/// The bookkeeping mutex is held only for map access, never across probes;
/// `lookup` and `store` on the same key are not atomic with respect to
/// each other, so racing callers may duplicate population work.
pub struct StreamCache {
    shelf: Mutex<Shelf>,
    prober: Arc<dyn Probe>,
    config: StreamCacheConfig,
}

impl StreamCache {
    pub fn new(prober: Arc<dyn Probe>, config: StreamCacheConfig) -> Self {
        Self { shelf: Mutex::new(Shelf { entries: HashMap::new(), order: VecDeque::new() }), prober, config }
    }

    /// Validated descriptors for `media_key`, plus the source tags that
    /// failed validation this pass.
    ///
    /// Every surviving descriptor was probed concurrently against its
    /// origin just now. Probe failures never propagate; they only mark the
    /// descriptor's source invalid so the caller can re-scrape it.
    pub async fn lookup(&self, media_key: &str) -> (Vec<StreamDescriptor>, Vec<String>) {
        if !self.config.enabled {
            return (Vec::new(), Vec::new());
        }

        let cached = {
            let shelf = self.shelf.lock().await;
            match shelf.entries.get(media_key) {
                Some(items) => items.clone(),
                None => return (Vec::new(), Vec::new()),
            }
        };

        let now = Utc::now().timestamp();
        let mut invalid_sources: BTreeSet<String> = BTreeSet::new();
        let mut candidates = Vec::new();

        for item in cached {
            if let Some(source) = &item.descriptor.source
                && invalid_sources.contains(source)
            {
                continue;
            }

            // Too close to expiry to survive a playback start.
            if now + self.config.safety_margin_secs >= item.expires_at {
                if let Some(source) = &item.descriptor.source {
                    invalid_sources.insert(source.clone());
                }
                continue;
            }

            // Would lapse mid-playback.
            if let Some(duration) = item.descriptor.duration_secs
                && item.expires_at - self.config.expiry_margin_secs < now + duration
            {
                if let Some(source) = &item.descriptor.source {
                    invalid_sources.insert(source.clone());
                }
                continue;
            }

            candidates.push(item.descriptor);
        }

        let probes = candidates.iter().map(|descriptor| {
            let target = effective_probe_url(&descriptor.url);
            let headers = descriptor.headers.clone();
            let prober = self.prober.clone();
            async move { prober.probe(&target, &headers).await }
        });
        let results = join_all(probes).await;

        let mut valid = Vec::new();
        for (descriptor, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(status) if (200..400).contains(&status) => valid.push(descriptor),
                Ok(status) => {
                    tracing::debug!(url = %descriptor.url, status, "stream probe rejected");
                    if let Some(source) = descriptor.source {
                        invalid_sources.insert(source);
                    }
                }
                Err(e) => {
                    tracing::debug!(url = %descriptor.url, error = %e, "stream probe failed");
                    if let Some(source) = descriptor.source {
                        invalid_sources.insert(source);
                    }
                }
            }
        }

        if !valid.is_empty() {
            let mut shelf = self.shelf.lock().await;
            if shelf.entries.contains_key(media_key) {
                shelf.touch(media_key);
            }
        }

        (valid, invalid_sources.into_iter().collect())
    }

    /// Cache `descriptors` under `media_key`.
    ///
    /// Blocked sources are dropped; an empty remainder is not stored.
    /// Inserting a new key at capacity evicts exactly one key, the least
    /// recently used.
    pub async fn store(&self, media_key: &str, descriptors: Vec<StreamDescriptor>) {
        if !self.config.enabled {
            return;
        }

        let now = Utc::now().timestamp();
        let cached: Vec<CachedStream> = descriptors
            .into_iter()
            .filter(|d| match &d.source {
                Some(source) => !self.config.blocked_sources.contains(source),
                None => true,
            })
            .map(|descriptor| {
                let expires_at = match (descriptor.ttl_secs, descriptor.expiry) {
                    // A declared TTL is the more explicit signal and wins
                    // over a pre-set expiry.
                    (Some(ttl), _) => now + ttl,
                    (None, Some(expiry)) => expiry,
                    (None, None) => now + self.config.default_ttl_secs,
                };
                CachedStream { descriptor, expires_at }
            })
            .collect();

        if cached.is_empty() {
            return;
        }

        let mut shelf = self.shelf.lock().await;

        if !shelf.entries.contains_key(media_key) && shelf.entries.len() >= self.config.max_keys {
            if let Some(oldest) = shelf.order.pop_front() {
                shelf.entries.remove(&oldest);
                tracing::debug!(media_key = %oldest, "evicted least recently used media key");
            }
        }

        shelf.entries.insert(media_key.to_string(), cached);
        shelf.touch(media_key);
    }

    /// Number of media keys currently cached.
    pub async fn key_count(&self) -> usize {
        self.shelf.lock().await.entries.len()
    }
}

/// Unwrap one layer of internal proxy encoding so the probe hits the true
/// origin instead of our own proxy route.
fn effective_probe_url(url: &str) -> String {
    if url.contains("/proxy/stream/")
        && let Ok(parsed) = url::Url::parse(url)
        && let Some((_, origin)) = parsed.query_pairs().find(|(key, _)| key == "url")
    {
        return origin.into_owned();
    }
    url.to_string()
}
