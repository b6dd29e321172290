//! Content-addressed entries: `<key>` is the digest the origin advertised,
//! and a hit requires the file to hash back to it.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tracing::debug;

use super::entry_path;
use crate::cache::verify::{HashAlgorithm, verify_stream};

#[derive(Debug, Clone, Copy, Default)]
pub struct HashBasedStore;

impl HashBasedStore {
    /// Open and verify `dir/key`.
    ///
    /// On a digest mismatch the entry is still accepted when `size_hint` is
    /// non-zero and equals the file length. The returned file is positioned
    /// at its start; on a miss the handle is closed before returning.
    pub async fn try_get(
        dir: &Path,
        key: &str,
        algorithm: HashAlgorithm,
        expected: &[u8],
        size_hint: u64,
    ) -> Option<File> {
        let path = entry_path(dir, key);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = ?path, error = %e, "Failed to open cached body");
                }
                return None;
            }
        };

        if verify_stream(&mut file, algorithm, expected).await {
            return Some(file);
        }

        if size_hint > 0 {
            match file.metadata().await {
                Ok(metadata) if metadata.len() == size_hint => {
                    debug!(key, size_hint, "Digest mismatch, accepted on size");
                    return Some(file);
                }
                Ok(_) => {}
                Err(e) => debug!(path = ?path, error = %e, "Failed to stat cached body"),
            }
        }

        debug!(key, %algorithm, "Cached entry failed verification");
        None
    }
}
