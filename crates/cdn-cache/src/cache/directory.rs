//! # Cache Directory
//!
//! Owns the cache root and the mtime-based sweep that runs when a directory
//! is assigned. Sweeping happens synchronously at assignment so it cannot
//! race a writer that was started against the same directory later.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Path prefix that assigns a directory without sweeping it
pub const SKIP_GC_MARKER: &str = "nogc://";

/// Outcome of a directory sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Top-level files examined
    pub scanned: usize,
    /// Files deleted
    pub removed: usize,
    /// Files that were due for deletion but could not be removed
    pub failed: usize,
}

/// What a sweep deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Files whose last write is older than the age limit
    Expired,
    /// Every top-level file
    All,
}

/// Split a configured path into the real path and whether GC is skipped
pub fn parse_cache_dir(raw: &str) -> (PathBuf, bool) {
    match raw.strip_prefix(SKIP_GC_MARKER) {
        Some(stripped) => (PathBuf::from(stripped), true),
        None => (PathBuf::from(raw), false),
    }
}

/// Delete stale top-level files of `dir`.
///
/// A missing directory is an empty sweep. Per-file failures are logged and
/// counted without aborting the sweep.
pub fn sweep_directory(
    dir: &Path,
    max_age: Duration,
    now: SystemTime,
    mode: SweepMode,
) -> io::Result<SweepReport> {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to read cache directory entry");
                continue;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to stat cache file");
                continue;
            }
        };
        report.scanned += 1;

        let expired = match mode {
            SweepMode::All => true,
            SweepMode::Expired => match metadata.modified() {
                Ok(modified) => now
                    .duration_since(modified)
                    .is_ok_and(|age| age > max_age),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to read modification time");
                    false
                }
            },
        };

        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = ?path, "Removed cache file");
                report.removed += 1;
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to remove cache file");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// The currently assigned cache root
#[derive(Debug, Default)]
pub struct CacheDirectory {
    path: RwLock<Option<PathBuf>>,
}

impl CacheDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.path.read().clone()
    }

    pub fn clear(&self) {
        *self.path.write() = None;
    }

    /// Assign the cache root and sweep it unless the skip-GC marker is set.
    ///
    /// The path is recorded before sweeping and stays assigned even when the
    /// sweep fails. Returns `None` when the sweep was skipped.
    pub fn assign(
        &self,
        raw: &str,
        max_age: Duration,
        now: SystemTime,
        force_clean: bool,
    ) -> Option<SweepReport> {
        let (path, skip_gc) = parse_cache_dir(raw);
        *self.path.write() = Some(path.clone());

        if skip_gc {
            info!(dir = ?path, "Cache directory assigned, garbage collection skipped");
            return None;
        }

        let mode = if force_clean {
            SweepMode::All
        } else {
            SweepMode::Expired
        };

        match sweep_directory(&path, max_age, now, mode) {
            Ok(report) => {
                info!(
                    dir = ?path,
                    scanned = report.scanned,
                    removed = report.removed,
                    failed = report.failed,
                    "Cache directory assigned"
                );
                Some(report)
            }
            Err(e) => {
                warn!(dir = ?path, error = %e, "Failed to sweep cache directory");
                Some(SweepReport::default())
            }
        }
    }
}
