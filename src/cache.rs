//! File-backed version cache
//!
//! The cache maps an item id to the version marker that was last downloaded,
//! unpacked and recorded successfully. It lives in a single human-readable JSON
//! object on disk:
//!
//! ```json
//! {
//!   "akismet": "2024-05-01 9:12pm GMT",
//!   "hello-dolly": "2023-11-20 4:01am GMT"
//! }
//! ```
//!
//! Writers are serialized by an async mutex held for the whole read-modify-write
//! cycle. The new snapshot is written to a sibling temporary file and renamed over
//! the old one, so readers (which do not take the lock) only ever see a complete
//! snapshot and a failed write leaves the previous file byte-for-byte intact.

use crate::error::{CacheWriteError, Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Persisted cache contents (item id -> version marker)
pub type CacheSnapshot = BTreeMap<String, String>;

/// Durable id -> version marker store shared by all pipelines of a run
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    /// Held for the full read-modify-write cycle of `record`
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Create a store backed by `path`; the file is created on the first `record`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` was last recorded with exactly `version_marker`
    ///
    /// A missing cache file means nothing is cached. An unreadable or corrupt file
    /// is logged and treated the same way, so the item gets downloaded again.
    pub async fn is_cached(&self, id: &str, version_marker: &str) -> bool {
        match read_snapshot(&self.path).await {
            Ok(snapshot) => snapshot.get(id).is_some_and(|v| v == version_marker),
            Err(e) => {
                warn!(
                    item_id = %id,
                    error = %e,
                    "cache unreadable, treating item as uncached"
                );
                false
            }
        }
    }

    /// Read the full persisted snapshot (empty when the file does not exist)
    pub async fn snapshot(&self) -> Result<CacheSnapshot> {
        Ok(read_snapshot(&self.path).await?)
    }

    /// Merge `{id: version_marker}` into the persisted snapshot
    ///
    /// Concurrent callers are serialized, so no update is lost. On failure the
    /// previously persisted file is left unchanged.
    pub async fn record(&self, id: &str, version_marker: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = read_snapshot(&self.path).await?;
        snapshot.insert(id.to_string(), version_marker.to_string());

        write_snapshot(&self.path, &snapshot)
            .await
            .map_err(Error::CacheWrite)?;

        debug!(
            item_id = %id,
            version = %version_marker,
            entries = snapshot.len(),
            "recorded cache entry"
        );
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> std::result::Result<CacheSnapshot, CacheWriteError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheSnapshot::new()),
        Err(e) => {
            return Err(CacheWriteError::ReadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| CacheWriteError::ParseFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Sibling file the next snapshot is staged in before being renamed into place
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache.json".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

async fn write_snapshot(
    path: &Path,
    snapshot: &CacheSnapshot,
) -> std::result::Result<(), CacheWriteError> {
    let write_failed = |e: std::io::Error| CacheWriteError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let body = serde_json::to_vec_pretty(snapshot).map_err(|e| CacheWriteError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let staging = staging_path(path);
    let staged = async {
        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        tokio::fs::rename(&staging, path).await
    }
    .await;

    if let Err(e) = staged {
        if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
            debug!(path = ?staging, error = %cleanup, "could not remove staged cache file");
        }
        return Err(write_failed(e));
    }

    Ok(())
}
