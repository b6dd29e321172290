//! # CDN Cache
//!
//! A local-disk response cache between an HTTP client and a CDN. Bodies are
//! streamed to the caller while being written through to disk, and later
//! requests are served from disk once the entry validates.
//!
//! ## Features
//!
//! - Content-addressed entries keyed by `Content-MD5` / `ETag` digests and
//!   re-verified on every hit (CRC32, CRC64, MD5, SHA-1, SHA-256)
//! - Time-based entries keyed by URL hash, bounded by `Expires` and a
//!   configurable ceiling
//! - At most one writer per key; concurrent requests stream uncached
//! - Atomic promotion of completed bodies, partial bodies are discarded
//! - Age-based garbage collection when a cache directory is assigned
//! - Cached HEAD status probes

pub mod body;
pub mod builder;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod status;
pub mod transport;

pub use body::{BodyOrigin, CdnBody};
pub use builder::CdnCacheConfigBuilder;
pub use cache::{CdnCache, HashAlgorithm, SKIP_GC_MARKER, SweepReport};
pub use clock::{Clock, SystemClock};
pub use config::{CdnCacheConfig, TransportConfig};
pub use error::CacheError;
pub use status::UrlStatusRecord;
pub use transport::{
    BoxByteStream, CdnRequest, CdnResponse, CdnTransport, ReqwestTransport, create_client,
};

// Re-exported so callers need not depend on tokio-util directly
pub use tokio_util::sync::CancellationToken;
