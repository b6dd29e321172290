//! # Write-Through Writer
//!
//! Persists a body to `<key>.temp` while it is being streamed to the caller
//! and promotes it to `<key>` by rename once the stream completed. Partial
//! bodies (read errors, cancellation, early drop) are discarded, never
//! promoted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::registry::{InFlightGuard, InFlightRegistry};
use super::store::{TimeBasedStore, entry_path, temp_path};

/// How the read loop feeding a writer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The source stream reached its end
    Completed,
    /// The source stream failed
    Failed,
    /// The caller cancelled the read
    Cancelled,
}

pub struct WriteThroughWriter {
    key: String,
    // Released only after the temp file is renamed or removed
    guard: Option<InFlightGuard>,
    file: Option<File>,
    dir: PathBuf,
    temp_path: PathBuf,
    final_path: PathBuf,
    expires_at: Option<SystemTime>,
    bytes_written: u64,
    finished: bool,
}

impl WriteThroughWriter {
    /// Claim `key` and open its temp file.
    ///
    /// Returns `None` when another writer owns the key or the temp file
    /// cannot be created; the caller then streams without caching.
    /// `expires_at` is set for time-based entries and is stamped after the
    /// body is promoted.
    pub async fn begin(
        registry: &Arc<InFlightRegistry>,
        dir: &Path,
        key: &str,
        expires_at: Option<SystemTime>,
    ) -> Option<Self> {
        let Some(guard) = registry.try_acquire(key) else {
            debug!(key, "Write already in flight, streaming uncached");
            return None;
        };

        if let Err(e) = fs::create_dir_all(dir).await {
            warn!(dir = ?dir, error = %e, "Failed to create cache directory");
            return None;
        }

        let temp_path = temp_path(dir, key);
        let file = match OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                warn!(path = ?temp_path, error = %e, "Failed to open cache temp file");
                return None;
            }
        };

        trace!(key, "Started write-through");
        Some(Self {
            key: key.to_owned(),
            guard: Some(guard),
            file: Some(file),
            dir: dir.to_path_buf(),
            temp_path,
            final_path: entry_path(dir, key),
            expires_at,
            bytes_written: 0,
            finished: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append a chunk to the temp file
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("cache writer already closed"))?;
        file.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Commit or roll back the entry and release the key.
    ///
    /// Only [`WriteOutcome::Completed`] promotes the temp file. Failures are
    /// logged and swallowed.
    pub async fn finalize(mut self, outcome: WriteOutcome) {
        self.finished = true;

        if outcome != WriteOutcome::Completed {
            debug!(key = self.key(), ?outcome, "Discarding partial cache entry");
            self.discard().await;
            return;
        }

        if let Err(e) = self.commit().await {
            warn!(key = self.key(), error = %e, "Failed to commit cache entry");
            self.discard().await;
        }
    }

    async fn commit(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_data().await?;
        }

        fs::rename(&self.temp_path, &self.final_path).await?;

        // Detach before stamping: a reader seeing the body without its stamp
        // just misses.
        self.guard.take();

        if let Some(expires_at) = self.expires_at {
            TimeBasedStore::write_stamp(&self.dir, &self.key, expires_at).await?;
        }

        debug!(
            key = self.key(),
            bytes = self.bytes_written,
            "Committed cache entry"
        );
        Ok(())
    }

    async fn discard(&mut self) {
        self.file.take();
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = ?self.temp_path, error = %e, "Failed to remove cache temp file");
            }
        }
        self.guard.take();
    }
}

impl Drop for WriteThroughWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // Dropped mid-stream: close the handle, then free the key only once
        // the partial file is gone.
        self.file.take();
        let temp_path = self.temp_path.clone();
        let guard = self.guard.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = fs::remove_file(temp_path).await;
                drop(guard);
            });
        } else {
            let _ = std::fs::remove_file(&temp_path);
            drop(guard);
        }
    }
}
