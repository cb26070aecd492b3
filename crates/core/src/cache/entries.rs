//! Cache entry rows and their CRUD operations.
//!
//! One row per distinct fetch fingerprint. The row holds everything needed
//! to serve or refresh a cached response except the body itself, which
//! lives in the body store under `body_path`.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use crate::Error;

/// Lifecycle state of a cache entry.
///
/// Staleness is not a stored state; it is derived from `expires_at` at
/// read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Row exists but holds no usable body yet; a read will populate it.
    Empty,
    /// A fetch is in flight; readers wait instead of re-triggering.
    Downloading,
    /// Body and response metadata are usable.
    Ready,
}

impl EntryState {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryState::Empty => "empty",
            EntryState::Downloading => "downloading",
            EntryState::Ready => "ready",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "downloading" => EntryState::Downloading,
            "ready" => EntryState::Ready,
            _ => EntryState::Empty,
        }
    }
}

/// A cached response's metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of (request_url, request_headers); primary key.
    pub id: String,
    pub state: EntryState,
    /// Original request, replayed on every refresh.
    pub request_url: String,
    /// Canonical JSON of the request header map.
    pub request_headers: String,
    /// Key into the body store.
    pub body_path: String,
    pub body_size: Option<i64>,
    /// JSON of the upstream response headers at last successful fetch.
    pub response_headers: Option<String>,
    pub response_status: Option<i32>,
    /// Relative TTL string last used to compute `expires_at`.
    pub ttl_spec: String,
    pub created_at: String,
    pub last_used_at: String,
    pub expires_at: Option<String>,
}

const ENTRY_COLUMNS: &str = "id, state, request_url, request_headers, body_path, body_size,
     response_headers, response_status, ttl_spec, created_at, last_used_at, expires_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<CacheEntry, rusqlite::Error> {
    let state: String = row.get(1)?;
    Ok(CacheEntry {
        id: row.get(0)?,
        state: EntryState::parse(&state),
        request_url: row.get(2)?,
        request_headers: row.get(3)?,
        body_path: row.get(4)?,
        body_size: row.get(5)?,
        response_headers: row.get(6)?,
        response_status: row.get(7)?,
        ttl_spec: row.get(8)?,
        created_at: row.get(9)?,
        last_used_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

impl CacheDb {
    /// Insert a fresh entry row.
    ///
    /// A racing insert for the same fingerprint trips the primary-key
    /// constraint and maps to [`Error::AlreadyExists`].
    pub async fn insert_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let result = conn.execute(
                    "INSERT INTO cache_entries (
                        id, state, request_url, request_headers, body_path, body_size,
                        response_headers, response_status, ttl_spec, created_at, last_used_at, expires_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        &entry.id,
                        entry.state.as_str(),
                        &entry.request_url,
                        &entry.request_headers,
                        &entry.body_path,
                        &entry.body_size,
                        &entry.response_headers,
                        &entry.response_status,
                        &entry.ttl_spec,
                        &entry.created_at,
                        &entry.last_used_at,
                        &entry.expires_at,
                    ],
                );

                match result {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Err(Error::AlreadyExists(entry.id.clone()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by fingerprint. Returns `None` when absent.
    pub async fn get_entry(&self, id: &str) -> Result<Option<CacheEntry>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE id = ?1"))?;
                let result = stmt.query_row(params![id], row_to_entry);

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Set only the lifecycle state of an entry.
    pub async fn set_entry_state(&self, id: &str, state: EntryState) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE cache_entries SET state = ?2 WHERE id = ?1",
                    params![id, state.as_str()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Record a completed fetch: response metadata, new expiry, `ready`.
    pub async fn finish_entry(&self, update: &EntryCompletion) -> Result<(), Error> {
        let update = update.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE cache_entries SET
                        state = 'ready',
                        body_size = ?2,
                        response_headers = ?3,
                        response_status = ?4,
                        ttl_spec = ?5,
                        expires_at = ?6
                    WHERE id = ?1",
                    params![
                        &update.id,
                        update.body_size,
                        &update.response_headers,
                        update.response_status,
                        &update.ttl_spec,
                        &update.expires_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Bump an entry's `last_used_at`.
    pub async fn touch_entry(&self, id: &str, last_used_at: &str) -> Result<(), Error> {
        let id = id.to_string();
        let last_used_at = last_used_at.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE cache_entries SET last_used_at = ?2 WHERE id = ?1",
                    params![id, last_used_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entry row. No-op when the row is already gone.
    pub async fn delete_entry(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM cache_entries WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// All fingerprints currently in the store.
    pub async fn list_entry_ids(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT id FROM cache_entries")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Error::from)
    }

    /// Fingerprints ordered least-recently-used first, for the size sweep.
    pub async fn list_entry_ids_by_last_used(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT id FROM cache_entries ORDER BY last_used_at ASC")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Error::from)
    }
}

/// Field set written when a populate succeeds.
#[derive(Debug, Clone)]
pub struct EntryCompletion {
    pub id: String,
    pub body_size: i64,
    pub response_headers: String,
    pub response_status: i32,
    pub ttl_spec: String,
    pub expires_at: String,
}
