//! # URL Status Probe
//!
//! HEAD-probe results cached as fixed 512-byte records named
//! `cached_status_<url key>`. Freshness comes from the file's modification
//! time alone.
//!
//! Record layout (little-endian):
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | status code (`i32`) |
//! | 4 | 4 | zero padding |
//! | 8 | 8 | content length (`i64`, 0 if unknown) |
//! | 16 | 496 | URL, UTF-8, NUL-terminated and NUL-padded |

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use byteorder::{ByteOrder, LittleEndian};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::cache::url_cache_key;
use crate::clock::saturating_add;
use crate::error::CacheError;
use crate::transport::{CdnRequest, CdnTransport};

pub const STATUS_RECORD_SIZE: usize = 512;

const STATUS_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 8;
const URL_OFFSET: usize = 16;
const URL_CAPACITY: usize = STATUS_RECORD_SIZE - URL_OFFSET;

const STATUS_FILE_PREFIX: &str = "cached_status_";

/// Result of a HEAD probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlStatusRecord {
    pub status_code: i32,
    pub file_size: i64,
    pub url: String,
}

impl UrlStatusRecord {
    pub fn new(status_code: i32, file_size: i64, url: impl Into<String>) -> Self {
        Self {
            status_code,
            file_size,
            url: url.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Encode into the fixed layout.
    ///
    /// URLs longer than 495 bytes are cut at a character boundary so the
    /// buffer always keeps a terminating NUL.
    pub fn encode(&self) -> [u8; STATUS_RECORD_SIZE] {
        let mut buf = [0u8; STATUS_RECORD_SIZE];
        LittleEndian::write_i32(&mut buf[STATUS_OFFSET..STATUS_OFFSET + 4], self.status_code);
        LittleEndian::write_i64(&mut buf[SIZE_OFFSET..SIZE_OFFSET + 8], self.file_size);

        let url = truncate_to_boundary(&self.url, URL_CAPACITY - 1);
        buf[URL_OFFSET..URL_OFFSET + url.len()].copy_from_slice(url.as_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes.len() != STATUS_RECORD_SIZE {
            return Err(CacheError::MalformedRecord(format!(
                "expected {STATUS_RECORD_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let status_code = LittleEndian::read_i32(&bytes[STATUS_OFFSET..STATUS_OFFSET + 4]);
        let file_size = LittleEndian::read_i64(&bytes[SIZE_OFFSET..SIZE_OFFSET + 8]);

        let url_field = &bytes[URL_OFFSET..];
        let Some(end) = url_field.iter().position(|&b| b == 0) else {
            return Err(CacheError::MalformedRecord(
                "URL is not NUL-terminated".to_string(),
            ));
        };
        let url = std::str::from_utf8(&url_field[..end])
            .map_err(|e| CacheError::MalformedRecord(format!("URL is not UTF-8: {e}")))?;

        Ok(Self {
            status_code,
            file_size,
            url: url.to_string(),
        })
    }
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Location of the cached record for `url`
pub fn status_record_path(dir: &Path, url: &Url) -> PathBuf {
    dir.join(format!("{STATUS_FILE_PREFIX}{}", url_cache_key(url)))
}

async fn read_fresh_record(
    path: &Path,
    max_expire: Duration,
    now: SystemTime,
) -> Option<UrlStatusRecord> {
    let metadata = fs::metadata(path).await.ok()?;
    let modified = metadata.modified().ok()?;
    if saturating_add(modified, max_expire) < now {
        debug!(path = ?path, "Cached status record is stale");
        return None;
    }

    let bytes = fs::read(path).await.ok()?;
    match UrlStatusRecord::decode(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(path = ?path, error = %e, "Ignoring malformed status record");
            None
        }
    }
}

async fn write_record(path: &Path, record: &UrlStatusRecord) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(path).await?;
    file.write_all(&record.encode()).await?;
    file.flush().await
}

/// Probe `url` with a HEAD request, reusing a fresh cached record when a
/// cache directory is given.
///
/// Any status code is a result, but only 2xx records are persisted. The
/// fresh record is returned even when persisting it fails.
pub async fn probe_url_status(
    transport: &dyn CdnTransport,
    url: &Url,
    cache_dir: Option<&Path>,
    max_expire: Duration,
    now: SystemTime,
    cancel: &CancellationToken,
) -> Result<UrlStatusRecord, CacheError> {
    let record_path = cache_dir.map(|dir| status_record_path(dir, url));

    if let Some(path) = &record_path {
        if let Some(record) = read_fresh_record(path, max_expire, now).await {
            debug!(url = %url, status = record.status_code, "Status probe served from cache");
            return Ok(record);
        }
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CacheError::Cancelled),
        response = transport.send(CdnRequest::head(url.clone())) => response?,
    };

    let file_size = response
        .content_length()
        .and_then(|len| i64::try_from(len).ok())
        .unwrap_or(0);
    let record = UrlStatusRecord::new(
        i32::from(response.status.as_u16()),
        file_size,
        url.as_str(),
    );
    drop(response);

    // Error statuses are returned but never replayed from disk
    if let Some(path) = record_path.as_ref().filter(|_| record.is_success()) {
        if let Err(e) = write_record(path, &record).await {
            warn!(path = ?path, error = %e, "Failed to cache status record");
        }
    }

    Ok(record)
}
