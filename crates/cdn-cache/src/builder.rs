//! # Builder for CdnCacheConfig
//!
//! Fluent construction of [`CdnCacheConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cdn_cache::CdnCacheConfig;
//!
//! let config = CdnCacheConfig::builder()
//!     .with_cache_dir("/tmp/cdn-cache")
//!     .with_max_expire(Duration::from_secs(300))
//!     .with_aggressive_mode(true)
//!     .with_header("X-Client", "launcher")
//!     .build();
//!
//! assert!(config.aggressive);
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::config::{CdnCacheConfig, TransportConfig};

/// Builder for creating CdnCacheConfig instances with a fluent API
#[derive(Debug, Clone, Default)]
pub struct CdnCacheConfigBuilder {
    config: CdnCacheConfig,
}

impl CdnCacheConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CdnCacheConfig::default(),
        }
    }

    /// Enable or disable caching
    pub fn with_caching_enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn with_aggressive_mode(mut self, aggressive: bool) -> Self {
        self.config.aggressive = aggressive;
        self
    }

    /// Set the cache root. A `nogc://` prefix skips the initial sweep.
    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn with_max_expire(mut self, max_expire: Duration) -> Self {
        self.config.max_expire = max_expire;
        self
    }

    pub fn with_force_clean(mut self, force: bool) -> Self {
        self.config.force_clean_on_assign = force;
        self
    }

    pub fn with_size_fallback(mut self, trust: bool) -> Self {
        self.config.trust_size_fallback = trust;
        self
    }

    /// Replace the whole transport configuration
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.transport.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.transport.user_agent = user_agent.into();
        self
    }

    /// Add a single header. Invalid names or values are logged and skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.transport.headers.insert(name, value);
            }
            _ => warn!(name, "Ignoring invalid header"),
        }
        self
    }

    /// Merge a header map over the current headers
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        self.config.transport = self.config.transport.with_extra_headers(headers);
        self
    }

    pub fn build(self) -> CdnCacheConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let config = CdnCacheConfigBuilder::new()
            .with_caching_enabled(false)
            .with_aggressive_mode(true)
            .with_cache_dir("nogc:///var/cache/cdn")
            .with_max_expire(Duration::from_secs(42))
            .with_force_clean(true)
            .with_size_fallback(true)
            .with_timeout(Duration::from_secs(5))
            .with_follow_redirects(false)
            .with_user_agent("agent/1.0")
            .build();

        assert!(!config.enabled);
        assert!(config.aggressive);
        assert_eq!(config.cache_dir.as_deref(), Some("nogc:///var/cache/cdn"));
        assert_eq!(config.max_expire, Duration::from_secs(42));
        assert!(config.force_clean_on_assign);
        assert!(config.trust_size_fallback);
        assert_eq!(config.transport.timeout, Duration::from_secs(5));
        assert!(!config.transport.follow_redirects);
        assert_eq!(config.transport.user_agent, "agent/1.0");
    }

    #[test]
    fn test_invalid_header_is_skipped() {
        let config = CdnCacheConfigBuilder::new()
            .with_header("bad header", "x")
            .with_header("X-Good", "yes")
            .build();
        assert_eq!(config.transport.headers.get("x-good").unwrap(), "yes");
        assert!(!config.transport.headers.contains_key("bad header"));
    }
}
