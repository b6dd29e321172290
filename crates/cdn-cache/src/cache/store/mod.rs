//! # Cache Stores
//!
//! Read-side lookups for the two validation strategies. Entries are written
//! only by [`WriteThroughWriter`](crate::cache::WriteThroughWriter).

pub mod hash;
pub mod time;

use std::path::{Path, PathBuf};

pub use self::hash::HashBasedStore;
pub use self::time::{TimeBasedHit, TimeBasedStore};

pub(crate) const TEMP_SUFFIX: &str = ".temp";
pub(crate) const STAMP_SUFFIX: &str = ".stamp";

/// Final location of the body cached under `key`
pub fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(key)
}

/// In-progress write location for `key`
pub fn temp_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}{TEMP_SUFFIX}"))
}

/// Expiry stamp location for a time-based `key`
pub fn stamp_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}{STAMP_SUFFIX}"))
}
