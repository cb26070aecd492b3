//! Database schema migrations.
//!
//! A `_migrations` version table tracks which SQL batches have been
//! applied; anything newer than the recorded version runs at open time.
//! Batches stay idempotent through CREATE IF NOT EXISTS.

use tokio_rusqlite::{Connection, params};

use crate::Error;

/// Ordered migration batches: (version, SQL).
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_cache_entries.sql"))];

/// Apply every migration newer than the database's recorded version.
///
/// # Errors
///
/// Returns [`Error::Database`] when a batch fails to execute; the version
/// row for a failed batch is never written, so a rerun retries it.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version, "applied cache schema migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
