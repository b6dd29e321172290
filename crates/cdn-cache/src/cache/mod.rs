//! # Cache Engine
//!
//! Key resolution, content verification, the on-disk stores, the in-flight
//! write registry and the write-through writer, composed by [`CdnCache`].

pub mod directory;
pub mod key;
mod manager;
pub mod registry;
pub mod store;
pub mod verify;
pub mod writer;

pub use directory::{
    CacheDirectory, SKIP_GC_MARKER, SweepMode, SweepReport, parse_cache_dir, sweep_directory,
};
pub use key::{
    CacheTarget, ValidationMode, resolve_cache_target, sanitize_validator, url_cache_key,
};
pub use manager::CdnCache;
pub use registry::{InFlightGuard, InFlightRegistry};
pub use store::{HashBasedStore, TimeBasedHit, TimeBasedStore};
pub use verify::{ContentHasher, HashAlgorithm, verify_stream};
pub use writer::{WriteOutcome, WriteThroughWriter};
