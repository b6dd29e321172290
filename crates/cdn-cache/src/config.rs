use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = concat!("cdn-cache/", env!("CARGO_PKG_VERSION"));

/// Default upper bound for entry freshness and the GC age threshold.
pub const DEFAULT_MAX_EXPIRE: Duration = Duration::from_secs(10 * 60);

/// Configuration for a [`CdnCache`](crate::CdnCache).
///
/// Fixed at construction. `enabled`, `aggressive` and `cache_dir` only seed
/// the runtime toggles, which can be changed later on the live cache.
#[derive(Debug, Clone)]
pub struct CdnCacheConfig {
    /// Whether caching is enabled at all
    pub enabled: bool,

    /// Look up a URL-keyed time-based entry before touching the network
    pub aggressive: bool,

    /// Cache root, optionally prefixed with [`SKIP_GC_MARKER`](crate::SKIP_GC_MARKER)
    pub cache_dir: Option<String>,

    /// Freshness ceiling for time-based entries and the GC age threshold
    pub max_expire: Duration,

    /// Delete every file on directory assignment, not just expired ones
    pub force_clean_on_assign: bool,

    /// Accept a hash-mismatched entry when its size equals the response's
    /// `Content-Length`
    pub trust_size_fallback: bool,

    /// HTTP client configuration for the default transport
    pub transport: TransportConfig,
}

impl Default for CdnCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            aggressive: false,
            cache_dir: None,
            max_expire: DEFAULT_MAX_EXPIRE,
            force_clean_on_assign: false,
            trust_size_fallback: false,
            transport: TransportConfig::default(),
        }
    }
}

impl CdnCacheConfig {
    pub fn builder() -> crate::builder::CdnCacheConfigBuilder {
        crate::builder::CdnCacheConfigBuilder::new()
    }
}

/// Options for the reqwest-backed transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for the entire HTTP request, zero for none
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Maximum time between body chunks
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Headers sent with every request
    pub headers: HeaderMap,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: TransportConfig::get_default_headers(),
        }
    }
}

impl TransportConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        // Bodies are hashed as received, so ask for them unencoded.
        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers
    }

    /// Merge custom headers over the defaults
    pub fn with_extra_headers(mut self, extra: &HeaderMap) -> Self {
        for (name, value) in extra.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CdnCacheConfig::default();
        assert!(config.enabled);
        assert!(!config.aggressive);
        assert_eq!(config.max_expire, Duration::from_secs(600));
        assert!(config.cache_dir.is_none());
        assert_eq!(
            config
                .transport
                .headers
                .get(reqwest::header::ACCEPT_ENCODING)
                .unwrap(),
            "identity"
        );
    }

    #[test]
    fn test_extra_headers_override_defaults() {
        let mut extra = HeaderMap::new();
        extra.insert(reqwest::header::ACCEPT, HeaderValue::from_static("text/plain"));
        extra.insert("x-token", HeaderValue::from_static("abc"));

        let transport = TransportConfig::default().with_extra_headers(&extra);
        assert_eq!(transport.headers.get(reqwest::header::ACCEPT).unwrap(), "text/plain");
        assert_eq!(transport.headers.get("x-token").unwrap(), "abc");
        assert!(transport.headers.contains_key(reqwest::header::CONNECTION));
    }
}
