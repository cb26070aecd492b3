//! Filesystem body store.
//!
//! Response bodies live outside the relational store, one file per
//! fingerprint. Writes stream chunk-by-chunk so a body is never buffered
//! whole in memory; a failed write removes its partial file before the
//! error propagates.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::fetch::ByteStream;

/// Body storage rooted at a single directory, addressed by fingerprint.
///
/// Cheap to clone; completeness of a body is signalled by the metadata
/// row's state, never by the file's presence alone.
#[derive(Clone, Debug)]
pub struct BodyStore {
    root: PathBuf,
}

impl BodyStore {
    /// Open the store, creating the root directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Absolute path of the body file for `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Stream `body` into the file for `key`, returning the byte count.
    ///
    /// Chunks are written in order. On any chunk or I/O failure the
    /// partial file is removed and the error propagates.
    pub async fn write_stream(&self, key: &str, body: ByteStream) -> Result<u64, Error> {
        let path = self.path(key);

        match write_chunks(&path, body).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(key, error = %cleanup, "failed to remove partial body file");
                }
                Err(e)
            }
        }
    }

    /// Remove the body for `key`. No-op when the file is already gone.
    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a body file exists for `key`.
    pub async fn exists(&self, key: &str) -> bool {
        fs::metadata(self.path(key)).await.is_ok()
    }

    /// Size in bytes of the body for `key`, zero when absent.
    pub async fn file_size(&self, key: &str) -> Result<u64, Error> {
        match fs::metadata(self.path(key)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Combined size in bytes of every stored body.
    pub async fn total_size(&self) -> Result<u64, Error> {
        let mut total = 0u64;
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(file) = dir.next_entry().await? {
            let meta = file.metadata().await?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        Ok(total)
    }
}

async fn write_chunks(path: &Path, mut body: ByteStream) -> Result<u64, Error> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
