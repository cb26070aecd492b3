//! Request-deduplicating, TTL-aware response cache engine.
//!
//! The engine fronts an arbitrary fetch capability with a persistent
//! metadata store and a filesystem body store. Per-fingerprint operations
//! are totally ordered through the keyed lock manager; concurrent callers
//! for the same request collapse into a single upstream fetch, everyone
//! else reads the cached result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::Mutex;

use super::connection::CacheDb;
use super::entries::{CacheEntry, EntryCompletion, EntryState};
use super::hash::{canonical_headers, fingerprint};
use super::storage::BodyStore;
use crate::Error;
use crate::fetch::Fetch;
use crate::lock::KeyedLocks;
use crate::ttl::parse_ttl;

/// Poll interval while another task's fetch is in flight.
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tunables for the response cache engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// TTL applied when a caller does not pass one.
    pub default_ttl: String,

    /// Total body-store size the maintenance sweep trims down to.
    pub max_total_bytes: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { default_ttl: "24h".to_string(), max_total_bytes: 200 * 1024 * 1024 }
    }
}

/// The response cache engine.
///
/// Cheap to clone; all clones share the same stores and locks. Constructed
/// once at process start and handed to every consumer, never a hidden
/// module-level singleton.
#[derive(Clone)]
pub struct ResponseCache {
    db: CacheDb,
    bodies: BodyStore,
    fetcher: Arc<dyn Fetch>,
    locks: Arc<KeyedLocks>,
    delete_serial: Arc<Mutex<()>>,
    options: Arc<EngineOptions>,
}

impl ResponseCache {
    pub fn new(
        db: CacheDb, bodies: BodyStore, fetcher: Arc<dyn Fetch>, locks: Arc<KeyedLocks>, options: EngineOptions,
    ) -> Self {
        Self { db, bodies, fetcher, locks, delete_serial: Arc::new(Mutex::new(())), options: Arc::new(options) }
    }

    /// Fingerprint for a request, exposed so callers can address entries
    /// they created through [`ResponseCache::get_or_create`].
    pub fn fingerprint(url: &str, headers: &BTreeMap<String, String>) -> String {
        fingerprint(url, headers)
    }

    /// Return the entry for (url, headers), creating and populating it on
    /// first sight.
    ///
    /// A duplicate-insert race with another creator is converted into a
    /// read; callers never see [`Error::AlreadyExists`] from here.
    pub async fn get_or_create(
        &self, url: &str, headers: &BTreeMap<String, String>, ttl_spec: Option<&str>,
    ) -> Result<CacheEntry, Error> {
        let id = fingerprint(url, headers);

        if self.db.get_entry(&id).await?.is_some() {
            return self.read(&id, ttl_spec).await;
        }

        match self.create(url, headers, ttl_spec).await {
            Err(Error::AlreadyExists(_)) => self.read(&id, ttl_spec).await,
            other => other,
        }
    }

    /// Insert a new entry and immediately populate it.
    ///
    /// When the populate step fails the fresh row is deleted again, so no
    /// half-populated rows survive a failed creation.
    pub async fn create(
        &self, url: &str, headers: &BTreeMap<String, String>, ttl_spec: Option<&str>,
    ) -> Result<CacheEntry, Error> {
        let id = fingerprint(url, headers);
        let _guard = self.locks.acquire(&id).await;

        let now = Utc::now().to_rfc3339();
        let entry = CacheEntry {
            id: id.clone(),
            state: EntryState::Empty,
            request_url: url.to_string(),
            request_headers: canonical_headers(headers),
            body_path: id.clone(),
            body_size: None,
            response_headers: None,
            response_status: None,
            ttl_spec: ttl_spec.unwrap_or(&self.options.default_ttl).to_string(),
            created_at: now.clone(),
            last_used_at: now,
            expires_at: None,
        };
        self.db.insert_entry(&entry).await?;

        match self.update_inner(&id, ttl_spec).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                // Entry lock is already held here, so bypass delete().
                if let Err(cleanup) = self.remove_row_and_body(&id).await {
                    tracing::warn!(fingerprint = %id, error = %cleanup, "failed to clean up after aborted create");
                }
                Err(e)
            }
        }
    }

    /// Refresh an entry from upstream.
    ///
    /// Fails with [`Error::NotFound`] when the row is absent and with
    /// [`Error::ConcurrentUpdate`] when a refresh is already in flight;
    /// callers hitting the latter should back off and `read` instead.
    pub async fn update(&self, id: &str, ttl_spec: Option<&str>) -> Result<CacheEntry, Error> {
        self.update_inner(id, ttl_spec).await
    }

    /// Read an entry, waiting out an in-flight refresh and triggering one
    /// when the entry is empty or stale. Bumps `last_used_at`.
    pub async fn read(&self, id: &str, ttl_spec: Option<&str>) -> Result<CacheEntry, Error> {
        let _guard = self.locks.acquire(id).await;
        self.read_inner(id, ttl_spec).await
    }

    /// Fingerprint + read, falling back to create on the first miss.
    ///
    /// The miss-then-create window is made atomic against other callers of
    /// this path by a lock keyed on `"<fingerprint>:create_or_read"`,
    /// without blocking direct `read`/`update` callers on the entry lock.
    pub async fn get_or_create_from_url(
        &self, url: &str, headers: Option<&BTreeMap<String, String>>, ttl_spec: Option<&str>,
    ) -> Result<CacheEntry, Error> {
        let empty = BTreeMap::new();
        let headers = headers.unwrap_or(&empty);
        let id = fingerprint(url, headers);

        let _guard = self.locks.acquire(&format!("{id}:create_or_read")).await;

        match self.read(&id, ttl_spec).await {
            Err(Error::NotFound(_)) => {
                // Trim the body store in the background while the new
                // entry downloads, as a fresh entry is what grows it.
                let sweeper = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = sweeper.evict_exceeding().await {
                        tracing::warn!(error = %e, "background size sweep failed");
                    }
                });

                match self.create(url, headers, ttl_spec).await {
                    Err(Error::AlreadyExists(_)) => self.read(&id, ttl_spec).await,
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Delete an entry and its body together. Idempotent and safe to call
    /// concurrently.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let _serial = self.delete_serial.lock().await;
        let _guard = self.locks.acquire(id).await;
        self.remove_row_and_body(id).await
    }

    /// Administrative bulk eviction: delete every entry in the store.
    ///
    /// Deletions are issued concurrently and are independently idempotent;
    /// individual failures are logged and skipped. Returns the number of
    /// entries actually deleted.
    pub async fn purge_all(&self) -> Result<u64, Error> {
        let ids = self.db.list_entry_ids().await?;
        let total = ids.len();

        let results = join_all(ids.iter().map(|id| self.delete(id))).await;

        let mut deleted = 0u64;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(fingerprint = %id, error = %e, "bulk eviction failed for entry"),
            }
        }

        tracing::info!(deleted, total, "bulk eviction finished");
        Ok(deleted)
    }

    /// Delete least-recently-used entries until the body store fits the
    /// configured size cap. Returns the number of evicted entries.
    pub async fn evict_exceeding(&self) -> Result<u64, Error> {
        let mut total = self.bodies.total_size().await?;
        if total <= self.options.max_total_bytes {
            return Ok(0);
        }

        let ids = self.db.list_entry_ids_by_last_used().await?;
        let mut evicted = 0u64;

        for id in ids {
            if total <= self.options.max_total_bytes {
                break;
            }

            let freed = match self.db.get_entry(&id).await? {
                Some(entry) => self.bodies.file_size(&entry.body_path).await?,
                None => 0,
            };
            self.delete(&id).await?;

            total = total.saturating_sub(freed);
            evicted += 1;
            tracing::debug!(fingerprint = %id, freed, "evicted entry to reclaim space");
        }

        Ok(evicted)
    }

    async fn read_inner(&self, id: &str, ttl_spec: Option<&str>) -> Result<CacheEntry, Error> {
        let mut entry = self
            .db
            .get_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        // Wait out a refresh some other task already has in flight. No
        // upper bound here; callers needing a timeout supply their own.
        while entry.state == EntryState::Downloading {
            tokio::time::sleep(DOWNLOAD_POLL_INTERVAL).await;
            entry = self
                .db
                .get_entry(id)
                .await?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
        }

        if entry.state == EntryState::Empty || is_expired(&entry) {
            entry = self.update_inner(id, ttl_spec).await?;
        }

        let now = Utc::now().to_rfc3339();
        self.db.touch_entry(id, &now).await?;
        entry.last_used_at = now;

        Ok(entry)
    }

    async fn update_inner(&self, id: &str, ttl_spec: Option<&str>) -> Result<CacheEntry, Error> {
        let entry = self
            .db
            .get_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if entry.state == EntryState::Downloading {
            return Err(Error::ConcurrentUpdate(id.to_string()));
        }

        self.db.set_entry_state(id, EntryState::Downloading).await?;

        // If this future is dropped mid-fetch (caller disconnect), the
        // guard resets the row so it never wedges in `downloading`.
        let mut guard = ResetOnCancel::new(self.db.clone(), id.to_string());

        match self.populate(&entry, ttl_spec).await {
            Ok(updated) => {
                guard.disarm();
                Ok(updated)
            }
            Err(e) => {
                guard.disarm();
                if let Err(reset) = self.db.set_entry_state(id, EntryState::Empty).await {
                    tracing::warn!(fingerprint = %id, error = %reset, "failed to reset entry after failed update");
                }
                Err(e)
            }
        }
    }

    async fn populate(&self, entry: &CacheEntry, ttl_spec: Option<&str>) -> Result<CacheEntry, Error> {
        let headers: BTreeMap<String, String> = serde_json::from_str(&entry.request_headers).unwrap_or_default();

        let response = self.fetcher.fetch(&entry.request_url, &headers).await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::UnexpectedStatus(response.status));
        }

        let body_size = self.bodies.write_stream(&entry.body_path, response.body).await?;

        let ttl_spec = ttl_spec.unwrap_or(&entry.ttl_spec);
        let expires_at = (Utc::now() + parse_ttl(ttl_spec)).to_rfc3339();

        self.db
            .finish_entry(&EntryCompletion {
                id: entry.id.clone(),
                body_size: body_size as i64,
                response_headers: serde_json::to_string(&response.headers).unwrap_or_else(|_| "{}".to_string()),
                response_status: i32::from(response.status),
                ttl_spec: ttl_spec.to_string(),
                expires_at,
            })
            .await?;

        tracing::debug!(fingerprint = %entry.id, body_size, "cached upstream response");

        self.db
            .get_entry(&entry.id)
            .await?
            .ok_or_else(|| Error::NotFound(entry.id.clone()))
    }

    async fn remove_row_and_body(&self, id: &str) -> Result<(), Error> {
        if let Some(entry) = self.db.get_entry(id).await? {
            self.db.delete_entry(id).await?;
            self.bodies.delete(&entry.body_path).await?;
        }
        Ok(())
    }
}

fn is_expired(entry: &CacheEntry) -> bool {
    match &entry.expires_at {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map(|expires| expires.with_timezone(&Utc) < Utc::now())
            .unwrap_or(true),
        None => true,
    }
}

/// Resets an entry to `empty` when an update future is dropped before it
/// settles.
struct ResetOnCancel {
    armed: Option<(CacheDb, String)>,
}

impl ResetOnCancel {
    fn new(db: CacheDb, id: String) -> Self {
        Self { armed: Some((db, id)) }
    }

    fn disarm(&mut self) {
        self.armed = None;
    }
}

impl Drop for ResetOnCancel {
    fn drop(&mut self) {
        if let Some((db, id)) = self.armed.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(e) = db.set_entry_state(&id, EntryState::Empty).await {
                    tracing::warn!(fingerprint = %id, error = %e, "failed to reset entry after cancelled update");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use futures_util::stream;
    use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

    struct FakeFetch {
        calls: AtomicUsize,
        status: AtomicU16,
        fail: AtomicBool,
        delay: Duration,
        body: Vec<u8>,
    }

    impl FakeFetch {
        fn new(body: &[u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status: AtomicU16::new(200),
                fail: AtomicBool::new(false),
                delay: Duration::ZERO,
                body: body.to_vec(),
            }
        }

        fn with_delay(body: &[u8], delay: Duration) -> Self {
            Self { delay, ..Self::new(body) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for FakeFetch {
        async fn fetch(&self, _url: &str, _headers: &BTreeMap<String, String>) -> Result<FetchedResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Fetch("connection refused".to_string()));
            }

            let mut headers = BTreeMap::new();
            headers.insert("content-type".to_string(), "video/mp4".to_string());

            Ok(FetchedResponse {
                status: self.status.load(Ordering::SeqCst),
                headers,
                body: stream::iter(vec![Ok(Bytes::from(self.body.clone()))]).boxed(),
            })
        }
    }

    async fn test_cache(fetch: Arc<FakeFetch>, options: EngineOptions) -> (ResponseCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = CacheDb::open_in_memory().await.unwrap();
        let bodies = BodyStore::open(dir.path()).await.unwrap();
        let cache = ResponseCache::new(db, bodies, fetch, Arc::new(KeyedLocks::default()), options);
        (cache, dir)
    }

    fn hours_from_now(entry: &CacheEntry) -> i64 {
        let expires = DateTime::parse_from_rfc3339(entry.expires_at.as_deref().unwrap()).unwrap();
        (expires.with_timezone(&Utc) - Utc::now()).num_hours()
    }

    #[tokio::test]
    async fn test_cold_cache_populate() {
        let fetch = Arc::new(FakeFetch::new(b"stream bytes"));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();

        assert_eq!(fetch.calls(), 1);
        assert_eq!(entry.state, EntryState::Ready);
        assert_eq!(entry.response_status, Some(200));
        assert_eq!(entry.body_size, Some(12));
        // Default TTL is 24h.
        assert!((23..=24).contains(&hours_from_now(&entry)));

        let again = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();

        assert_eq!(fetch.calls(), 1);
        assert_eq!(again.id, entry.id);
        assert!(again.last_used_at >= entry.last_used_at);
    }

    #[tokio::test]
    async fn test_ttl_override() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch, EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, Some("2d"))
            .await
            .unwrap();

        assert!((47..=48).contains(&hours_from_now(&entry)));
        assert_eq!(entry.ttl_spec, "2d");
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing_entry() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let mut headers = BTreeMap::new();
        headers.insert("referer".to_string(), "https://example.com".to_string());

        let first = cache.get_or_create("https://example.com/a", &headers, None).await.unwrap();
        let second = cache.get_or_create("https://example.com/a", &headers, None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch, EngineOptions::default()).await;

        let result = cache.read("deadbeef", None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_forced_refresh_after_expiry() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();
        assert_eq!(fetch.calls(), 1);

        // Backdate the expiry so the next read refreshes.
        cache
            .db
            .finish_entry(&EntryCompletion {
                id: entry.id.clone(),
                body_size: 1,
                response_headers: "{}".to_string(),
                response_status: 200,
                ttl_spec: "24h".to_string(),
                expires_at: (Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
            })
            .await
            .unwrap();

        let refreshed = cache.read(&entry.id, None).await.unwrap();
        assert_eq!(fetch.calls(), 2);
        assert_eq!(refreshed.state, EntryState::Ready);
        assert!(hours_from_now(&refreshed) >= 23);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_row() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        fetch.status.store(502, Ordering::SeqCst);
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let result = cache.create("https://example.com/bad", &BTreeMap::new(), None).await;
        assert!(matches!(result, Err(Error::UnexpectedStatus(502))));

        let id = ResponseCache::fingerprint("https://example.com/bad", &BTreeMap::new());
        assert!(cache.db.get_entry(&id).await.unwrap().is_none());
        assert!(!cache.bodies.exists(&id).await);
    }

    #[tokio::test]
    async fn test_failed_update_resets_to_empty() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();

        fetch.fail.store(true, Ordering::SeqCst);
        let result = cache.update(&entry.id, None).await;
        assert!(matches!(result, Err(Error::Fetch(_))));

        let after = cache.db.get_entry(&entry.id).await.unwrap().unwrap();
        assert_eq!(after.state, EntryState::Empty);

        // A later read retries cleanly once the upstream recovers.
        fetch.fail.store(false, Ordering::SeqCst);
        let recovered = cache.read(&entry.id, None).await.unwrap();
        assert_eq!(recovered.state, EntryState::Ready);
        assert_eq!(fetch.calls(), 3);
    }

    #[tokio::test]
    async fn test_update_while_downloading_is_rejected() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch, EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();
        cache
            .db
            .set_entry_state(&entry.id, EntryState::Downloading)
            .await
            .unwrap();

        let result = cache.update(&entry.id, None).await;
        assert!(matches!(result, Err(Error::ConcurrentUpdate(_))));
    }

    #[tokio::test]
    async fn test_read_waits_out_downloading() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();
        cache
            .db
            .set_entry_state(&entry.id, EntryState::Downloading)
            .await
            .unwrap();

        // Simulate the in-flight refresh finishing a little later.
        let db = cache.db.clone();
        let id = entry.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            db.finish_entry(&EntryCompletion {
                id,
                body_size: 1,
                response_headers: "{}".to_string(),
                response_status: 200,
                ttl_spec: "24h".to_string(),
                expires_at: (Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
            })
            .await
            .unwrap();
        });

        let read = cache.read(&entry.id, None).await.unwrap();
        assert_eq!(read.state, EntryState::Ready);
        // The waiting read never re-fetched on its own.
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn test_at_most_one_writer() {
        let fetch = Arc::new(FakeFetch::with_delay(b"x", Duration::from_millis(30)));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create_from_url("https://example.com/a", None, None)
                    .await
            }));
        }

        for handle in handles {
            let entry = handle.await.unwrap().unwrap();
            assert_eq!(entry.state, EntryState::Ready);
        }

        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_update_resets_to_empty() {
        let fetch = Arc::new(FakeFetch::with_delay(b"x", Duration::from_millis(500)));
        let (cache, _dir) = test_cache(fetch.clone(), EngineOptions::default()).await;

        // Seed a row without populating it.
        let now = Utc::now().to_rfc3339();
        let id = ResponseCache::fingerprint("https://example.com/a", &BTreeMap::new());
        cache
            .db
            .insert_entry(&CacheEntry {
                id: id.clone(),
                state: EntryState::Empty,
                request_url: "https://example.com/a".to_string(),
                request_headers: "{}".to_string(),
                body_path: id.clone(),
                body_size: None,
                response_headers: None,
                response_status: None,
                ttl_spec: "24h".to_string(),
                created_at: now.clone(),
                last_used_at: now,
                expires_at: None,
            })
            .await
            .unwrap();

        let updater = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move { cache.update(&id, None).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mid = cache.db.get_entry(&id).await.unwrap().unwrap();
        assert_eq!(mid.state, EntryState::Downloading);

        updater.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let after = cache.db.get_entry(&id).await.unwrap().unwrap();
        assert_eq!(after.state, EntryState::Empty);
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch, EngineOptions::default()).await;

        let entry = cache
            .get_or_create_from_url("https://example.com/a", None, None)
            .await
            .unwrap();
        assert!(cache.bodies.exists(&entry.body_path).await);

        cache.delete(&entry.id).await.unwrap();
        cache.delete(&entry.id).await.unwrap();
        cache.delete("never-existed").await.unwrap();

        assert!(cache.db.get_entry(&entry.id).await.unwrap().is_none());
        assert!(!cache.bodies.exists(&entry.body_path).await);
    }

    #[tokio::test]
    async fn test_purge_all() {
        let fetch = Arc::new(FakeFetch::new(b"x"));
        let (cache, _dir) = test_cache(fetch, EngineOptions::default()).await;

        for path in ["a", "b", "c"] {
            cache
                .get_or_create_from_url(&format!("https://example.com/{path}"), None, None)
                .await
                .unwrap();
        }

        let deleted = cache.purge_all().await.unwrap();
        assert_eq!(deleted, 3);
        assert!(cache.db.list_entry_ids().await.unwrap().is_empty());
        assert_eq!(cache.bodies.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_evict_exceeding_removes_lru_first() {
        let fetch = Arc::new(FakeFetch::new(b"12345678"));
        let options = EngineOptions { max_total_bytes: 10, ..Default::default() };
        let (cache, _dir) = test_cache(fetch, options).await;

        for path in ["a", "b", "c"] {
            cache
                .create(&format!("https://example.com/{path}"), &BTreeMap::new(), None)
                .await
                .unwrap();
        }

        // Make "c" clearly the most recently used entry.
        let keep = ResponseCache::fingerprint("https://example.com/c", &BTreeMap::new());
        cache
            .db
            .touch_entry(&keep, &(Utc::now() + chrono::Duration::hours(1)).to_rfc3339())
            .await
            .unwrap();

        let evicted = cache.evict_exceeding().await.unwrap();
        assert_eq!(evicted, 2);

        let remaining = cache.db.list_entry_ids().await.unwrap();
        assert_eq!(remaining, vec![keep]);
        assert!(cache.bodies.total_size().await.unwrap() <= 10);
    }

    #[tokio::test]
    async fn test_size_sweep_loop_trims_store() {
        let fetch = Arc::new(FakeFetch::new(b"12345678"));
        let options = EngineOptions { max_total_bytes: 10, ..Default::default() };
        let (cache, _dir) = test_cache(fetch, options).await;

        for path in ["a", "b", "c"] {
            cache
                .create(&format!("https://example.com/{path}"), &BTreeMap::new(), None)
                .await
                .unwrap();
        }

        let sweeper = tokio::spawn(crate::maintenance::run_size_sweep(cache.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert!(cache.bodies.total_size().await.unwrap() <= 10);
    }
}
