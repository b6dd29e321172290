//! # CDN Cache
//!
//! The request lifecycle: optional pre-flight lookup (aggressive mode),
//! request, header-driven lookup, then write-through on a miss. The cache is
//! additive; only transport failures and cancellation fail a request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::directory::{CacheDirectory, SweepMode, SweepReport, sweep_directory};
use super::key::{CacheTarget, ValidationMode, resolve_cache_target, url_cache_key};
use super::registry::InFlightRegistry;
use super::store::{HashBasedStore, TimeBasedStore, entry_path};
use super::writer::WriteThroughWriter;
use crate::body::CdnBody;
use crate::clock::{Clock, SystemClock};
use crate::config::CdnCacheConfig;
use crate::error::CacheError;
use crate::status::{UrlStatusRecord, probe_url_status};
use crate::transport::{CdnRequest, CdnResponse, CdnTransport, ReqwestTransport};

#[derive(Debug, Clone, Copy)]
struct RuntimeToggles {
    enabled: bool,
    aggressive: bool,
}

/// Disk-backed cache in front of a CDN.
///
/// Build one per application and share it (it is `Send + Sync`); the
/// in-flight registry only prevents duplicate writers within one instance.
pub struct CdnCache {
    transport: Arc<dyn CdnTransport>,
    clock: Arc<dyn Clock>,
    max_expire: Duration,
    force_clean_on_assign: bool,
    trust_size_fallback: bool,
    toggles: RwLock<RuntimeToggles>,
    directory: CacheDirectory,
    registry: Arc<InFlightRegistry>,
}

impl CdnCache {
    /// Create a cache using the reqwest transport built from `config`
    pub fn new(config: CdnCacheConfig) -> Result<Self, CacheError> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: CdnCacheConfig, transport: Arc<dyn CdnTransport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CdnCacheConfig,
        transport: Arc<dyn CdnTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Self {
            transport,
            clock,
            max_expire: config.max_expire,
            force_clean_on_assign: config.force_clean_on_assign,
            trust_size_fallback: config.trust_size_fallback,
            toggles: RwLock::new(RuntimeToggles {
                enabled: config.enabled,
                aggressive: config.aggressive,
            }),
            directory: CacheDirectory::new(),
            registry: Arc::new(InFlightRegistry::new()),
        };

        if let Some(dir) = &config.cache_dir {
            cache.set_directory(dir);
        }
        cache
    }

    pub fn is_enabled(&self) -> bool {
        self.toggles.read().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.toggles.write().enabled = enabled;
    }

    pub fn is_aggressive(&self) -> bool {
        self.toggles.read().aggressive
    }

    pub fn set_aggressive(&self, aggressive: bool) {
        self.toggles.write().aggressive = aggressive;
    }

    pub fn max_expire(&self) -> Duration {
        self.max_expire
    }

    /// Current cache root, with any skip-GC marker stripped
    pub fn current_directory(&self) -> Option<PathBuf> {
        self.directory.path()
    }

    /// Assign the cache root, sweeping expired files unless the path carries
    /// the skip-GC marker
    pub fn set_directory(&self, dir: &str) -> Option<SweepReport> {
        self.set_directory_with(dir, self.force_clean_on_assign)
    }

    /// Assign the cache root; `force_clean` deletes every file, fresh or not
    pub fn set_directory_with(&self, dir: &str, force_clean: bool) -> Option<SweepReport> {
        self.directory
            .assign(dir, self.max_expire, self.clock.now(), force_clean)
    }

    /// Stop persisting responses without disabling the cache
    pub fn clear_directory(&self) {
        self.directory.clear();
    }

    /// Delete every file in the current cache root
    pub fn clean_directory(&self) -> Result<SweepReport, CacheError> {
        let Some(dir) = self.directory.path() else {
            return Ok(SweepReport::default());
        };
        Ok(sweep_directory(
            &dir,
            self.max_expire,
            self.clock.now(),
            SweepMode::All,
        )?)
    }

    /// Where the body for `key` lives, if a directory is assigned
    pub fn cache_path_for(&self, key: &str) -> Option<PathBuf> {
        self.directory.path().map(|dir| entry_path(&dir, key))
    }

    /// Keys with a write currently in progress
    pub fn in_flight_writes(&self) -> usize {
        self.registry.len()
    }

    /// Fetch `url`, serving from or populating the cache
    pub async fn fetch(&self, url: &str) -> Result<CdnBody, CacheError> {
        self.fetch_with_cancel(url, CancellationToken::new()).await
    }

    /// Fetch `url` and read the whole body
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, CacheError> {
        self.fetch(url).await?.bytes().await
    }

    /// Fetch `url`; cancelling `cancel` aborts the request or body reads
    pub async fn fetch_with_cancel(
        &self,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<CdnBody, CacheError> {
        let url = Url::parse(url)?;
        let toggles = *self.toggles.read();

        let dir = match self.directory.path() {
            Some(dir) if toggles.enabled => dir,
            _ => {
                debug!(url = %url, enabled = toggles.enabled, "Cache bypassed");
                let response = self.send_get(&url, &cancel).await?;
                let len = response.content_length();
                return Ok(CdnBody::network(response.body, len, cancel));
            }
        };

        if toggles.aggressive {
            let key = url_cache_key(&url);
            if let Some(hit) = TimeBasedStore::try_get(&dir, &key, self.clock.now()).await {
                debug!(url = %url, key = %key, "Served from cache before request");
                return Ok(self.cached_body(hit.file, cancel).await);
            }
        }

        let response = self.send_get(&url, &cancel).await?;
        let now = self.clock.now();
        let content_length = response.content_length();

        let Some(target) = resolve_cache_target(
            &response.headers,
            &url,
            now,
            self.max_expire,
            toggles.aggressive,
        ) else {
            debug!(url = %url, "Response is not cacheable");
            return Ok(CdnBody::network(response.body, content_length, cancel));
        };

        if let Some(file) = self.lookup(&dir, &target, content_length, now).await {
            debug!(url = %url, key = %target.key, "Served from cache");
            drop(response);
            return Ok(self.cached_body(file, cancel).await);
        }

        let expires_at = target.expires_at();
        match WriteThroughWriter::begin(&self.registry, &dir, &target.key, expires_at).await {
            Some(writer) => {
                debug!(url = %url, key = %target.key, "Caching response");
                Ok(CdnBody::write_through(
                    response.body,
                    writer,
                    content_length,
                    cancel,
                ))
            }
            None => Ok(CdnBody::network(response.body, content_length, cancel)),
        }
    }

    async fn lookup(
        &self,
        dir: &std::path::Path,
        target: &CacheTarget,
        content_length: Option<u64>,
        now: SystemTime,
    ) -> Option<File> {
        match &target.mode {
            ValidationMode::HashBased { algorithm, digest } => {
                let size_hint = if self.trust_size_fallback {
                    content_length.unwrap_or(0)
                } else {
                    0
                };
                HashBasedStore::try_get(dir, &target.key, *algorithm, digest, size_hint).await
            }
            ValidationMode::TimeBased { .. } => TimeBasedStore::try_get(dir, &target.key, now)
                .await
                .map(|hit| hit.file),
        }
    }

    async fn cached_body(&self, file: File, cancel: CancellationToken) -> CdnBody {
        let len = file.metadata().await.ok().map(|m| m.len());
        CdnBody::cached(file, len, cancel)
    }

    async fn send_get(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<CdnResponse, CacheError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CacheError::Cancelled),
            response = self.transport.send(CdnRequest::get(url.clone())) => response?,
        };

        if !response.status.is_success() {
            debug!(url = %url, status = %response.status, "Request failed");
            return Err(CacheError::StatusCode(response.status));
        }
        Ok(response)
    }

    /// HEAD-probe `url`, reusing a cached record while it is fresh
    pub async fn probe_status(&self, url: &str) -> Result<UrlStatusRecord, CacheError> {
        self.probe_status_with_cancel(url, CancellationToken::new())
            .await
    }

    pub async fn probe_status_with_cancel(
        &self,
        url: &str,
        cancel: CancellationToken,
    ) -> Result<UrlStatusRecord, CacheError> {
        let url = Url::parse(url)?;
        let dir = if self.is_enabled() {
            self.directory.path()
        } else {
            None
        };

        probe_url_status(
            self.transport.as_ref(),
            &url,
            dir.as_deref(),
            self.max_expire,
            self.clock.now(),
            &cancel,
        )
        .await
    }
}

impl std::fmt::Debug for CdnCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnCache")
            .field("toggles", &*self.toggles.read())
            .field("directory", &self.directory.path())
            .field("max_expire", &self.max_expire)
            .field("in_flight", &self.registry.len())
            .finish_non_exhaustive()
    }
}
