//! Expiry-stamped entries: `<key>` holds the body, `<key>.stamp` holds the
//! expiry instant as 8 little-endian bytes of Unix milliseconds.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use byteorder::{ByteOrder, LittleEndian};
use tokio::fs::{self, File};
use tracing::debug;

use super::{entry_path, stamp_path};
use crate::clock::{from_unix_millis, to_unix_millis};

const STAMP_LEN: usize = 8;

pub fn encode_stamp(expires_at: SystemTime) -> [u8; STAMP_LEN] {
    let mut buf = [0u8; STAMP_LEN];
    LittleEndian::write_i64(&mut buf, to_unix_millis(expires_at));
    buf
}

/// Decode a stamp; anything but exactly one value is rejected
pub fn decode_stamp(bytes: &[u8]) -> Option<SystemTime> {
    if bytes.len() != STAMP_LEN {
        return None;
    }
    Some(from_unix_millis(LittleEndian::read_i64(bytes)))
}

/// A fresh time-based entry, opened for reading
#[derive(Debug)]
pub struct TimeBasedHit {
    pub file: File,
    pub expires_at: SystemTime,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeBasedStore;

impl TimeBasedStore {
    /// Open `dir/key` if its stamp is readable and still in the future
    pub async fn try_get(dir: &Path, key: &str, now: SystemTime) -> Option<TimeBasedHit> {
        let data_path = entry_path(dir, key);
        let stamp_path = stamp_path(dir, key);

        let stamp = match fs::read(&stamp_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = ?stamp_path, error = %e, "Failed to read expiry stamp");
                }
                return None;
            }
        };

        let Some(expires_at) = decode_stamp(&stamp) else {
            debug!(path = ?stamp_path, len = stamp.len(), "Malformed expiry stamp");
            return None;
        };

        if expires_at <= now {
            debug!(key, "Time-based entry expired");
            return None;
        }

        match File::open(&data_path).await {
            Ok(file) => Some(TimeBasedHit { file, expires_at }),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = ?data_path, error = %e, "Failed to open cached body");
                }
                None
            }
        }
    }

    /// Write the expiry stamp for `key`
    pub async fn write_stamp(dir: &Path, key: &str, expires_at: SystemTime) -> io::Result<()> {
        fs::write(stamp_path(dir, key), encode_stamp(expires_at)).await
    }
}
