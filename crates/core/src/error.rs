//! Unified error types for marquee.
//!
//! Every fallible operation in the cache core reports through this enum so
//! callers (route handlers, scrapers) can match on a single type at the seam.

use tokio_rusqlite::rusqlite;

/// Unified error type for the marquee cache core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No cache entry exists for the given fingerprint. Recoverable by
    /// creating one.
    #[error("no cache entry for fingerprint '{0}'")]
    NotFound(String),

    /// A create raced with another create for the same fingerprint.
    /// Recoverable by re-reading; never surfaced past the get-or-create
    /// paths.
    #[error("a cache entry for fingerprint '{0}' already exists")]
    AlreadyExists(String),

    /// An update was requested while another one is in flight for the same
    /// fingerprint.
    #[error("cache entry '{0}' is already being updated")]
    ConcurrentUpdate(String),

    /// Upstream returned a status outside the accepted success range while
    /// populating an entry.
    #[error("unexpected upstream status {0} while caching")]
    UnexpectedStatus(u16),

    /// Transport-level failure while talking to an upstream.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The URL could not be parsed or canonicalized.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The URL matched neither the allowed hosts nor the allowed patterns.
    #[error("url blocked by proxy: {0}")]
    UrlBlocked(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Body store I/O failure.
    #[error("body store error: {0}")]
    Storage(#[from] std::io::Error),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
