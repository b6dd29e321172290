//! # Cache Key Resolution
//!
//! Derives the on-disk key and validation strategy for a live response from
//! its headers. Content identity (`Content-MD5`, then `ETag`) wins over
//! freshness (`Expires`).

use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use reqwest::header::{ETAG, EXPIRES, HeaderMap, HeaderName};
use tracing::debug;
use url::Url;
use xxhash_rust::xxh3::xxh3_64;

use super::verify::HashAlgorithm;
use crate::clock::saturating_add;

const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// Base64 with optional padding; sanitizing strips trailing `=`.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How a cached entry is validated before being served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMode {
    /// Re-hash the file and compare against the advertised digest
    HashBased {
        algorithm: HashAlgorithm,
        digest: Vec<u8>,
    },
    /// Serve while the stamped expiry lies in the future
    TimeBased { expires_at: SystemTime },
}

/// Key and validation mode for a cacheable response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTarget {
    pub key: String,
    pub mode: ValidationMode,
}

impl CacheTarget {
    pub fn is_hash_based(&self) -> bool {
        matches!(self.mode, ValidationMode::HashBased { .. })
    }

    /// Expiry instant to stamp, for time-based targets
    pub fn expires_at(&self) -> Option<SystemTime> {
        match self.mode {
            ValidationMode::TimeBased { expires_at } => Some(expires_at),
            ValidationMode::HashBased { .. } => None,
        }
    }
}

/// Key for URL-addressed entries: xxHash3 of the absolute URL as hex
pub fn url_cache_key(url: &Url) -> String {
    format!("{:016x}", xxh3_64(url.as_str().as_bytes()))
}

/// Strip CDN decorations from a validator header value.
///
/// Removes surrounding non-alphanumeric runs (quotes and the like), a weak
/// `W/` prefix and a trailing `-<digits>` part-count suffix.
pub fn sanitize_validator(raw: &str) -> &str {
    let mut value = trim_symbols(raw);

    if let Some(rest) = value.strip_prefix("W/") {
        value = trim_symbols(rest);
    }

    if let Some((head, tail)) = value.rsplit_once('-') {
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            value = trim_symbols(head);
        }
    }

    value
}

fn trim_symbols(value: &str) -> &str {
    value.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Decode a `Content-MD5` value given as hex or Base64 into 16 bytes
fn decode_content_md5(value: &str) -> Option<Vec<u8>> {
    let md5_len = HashAlgorithm::Md5.digest_len();

    if value.len() == md5_len * 2 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(value).ok();
    }

    LENIENT_BASE64
        .decode(value)
        .ok()
        .filter(|bytes| bytes.len() == md5_len)
}

fn resolve_content_md5(headers: &HeaderMap) -> Option<CacheTarget> {
    let raw = header_str(headers, &CONTENT_MD5)?;
    // Base64 may legitimately begin with `+` or `/`, so try the value with
    // only quotes removed before the full sanitizer.
    let unquoted = raw.trim_matches('"');
    let digest =
        decode_content_md5(unquoted).or_else(|| decode_content_md5(sanitize_validator(raw)))?;

    Some(CacheTarget {
        key: hex::encode(&digest),
        mode: ValidationMode::HashBased {
            algorithm: HashAlgorithm::Md5,
            digest,
        },
    })
}

fn resolve_etag(headers: &HeaderMap) -> Option<CacheTarget> {
    let raw = header_str(headers, &ETAG)?;
    let value = sanitize_validator(raw);

    if value.is_empty() || value.len() % 2 != 0 {
        return None;
    }

    // hex::decode rejects anything outside [0-9a-fA-F]
    let digest = hex::decode(value).ok()?;
    let Some(algorithm) = HashAlgorithm::from_digest_len(digest.len()) else {
        debug!(etag = raw, len = digest.len(), "ETag length matches no known digest");
        return None;
    };

    Some(CacheTarget {
        key: value.to_ascii_lowercase(),
        mode: ValidationMode::HashBased { algorithm, digest },
    })
}

fn resolve_expiry(
    headers: &HeaderMap,
    url: &Url,
    now: SystemTime,
    max_expire: Duration,
    aggressive: bool,
) -> Option<CacheTarget> {
    let ceiling = saturating_add(now, max_expire);

    let expires_at = match header_str(headers, &EXPIRES) {
        Some(raw) => match chrono::DateTime::parse_from_rfc2822(raw) {
            Ok(parsed) => SystemTime::from(parsed).min(ceiling),
            Err(e) => {
                debug!(expires = raw, error = %e, "Unparseable Expires header");
                if !aggressive {
                    return None;
                }
                ceiling
            }
        },
        None if aggressive => ceiling,
        None => return None,
    };

    if expires_at <= now {
        return None;
    }

    Some(CacheTarget {
        key: url_cache_key(url),
        mode: ValidationMode::TimeBased { expires_at },
    })
}

/// Work out how a response may be cached.
///
/// Returns `None` when nothing usable is present; the body is then streamed
/// without persistence. Malformed headers fall through to the next strategy.
pub fn resolve_cache_target(
    headers: &HeaderMap,
    url: &Url,
    now: SystemTime,
    max_expire: Duration,
    aggressive: bool,
) -> Option<CacheTarget> {
    resolve_content_md5(headers)
        .or_else(|| resolve_etag(headers))
        .or_else(|| resolve_expiry(headers, url, now, max_expire, aggressive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::time::UNIX_EPOCH;

    const TEN_MINUTES: Duration = Duration::from_secs(600);

    fn url() -> Url {
        Url::parse("https://cdn.example/a.bin").unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn now() -> SystemTime {
        // 2023-11-14T22:13:20Z, whole seconds so HTTP dates round-trip
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn http_date(time: SystemTime) -> String {
        chrono::DateTime::<chrono::Utc>::from(time)
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }

    #[test]
    fn test_sanitize_strips_decorations() {
        assert_eq!(
            sanitize_validator("\"d41d8cd98f00b204e9800998ecf8427e-1\""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(sanitize_validator("W/\"abcd\""), "abcd");
        assert_eq!(sanitize_validator("  'abcd-12'  "), "abcd");
        assert_eq!(sanitize_validator("\"\""), "");
        // base64 padding is trimmed
        assert_eq!(
            sanitize_validator("1B2M2Y8AsgTpgAmY7PhCfg=="),
            "1B2M2Y8AsgTpgAmY7PhCfg"
        );
    }

    #[test]
    fn test_etag_with_part_suffix_resolves_to_md5() {
        let h = headers(&[("etag", "\"d41d8cd98f00b204e9800998ecf8427e-1\"")]);
        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(target.key, "d41d8cd98f00b204e9800998ecf8427e");
        match target.mode {
            ValidationMode::HashBased { algorithm, digest } => {
                assert_eq!(algorithm, HashAlgorithm::Md5);
                assert_eq!(hex::encode(digest), "d41d8cd98f00b204e9800998ecf8427e");
            }
            other => panic!("expected hash-based mode, got {other:?}"),
        }
    }

    #[test]
    fn test_etag_digest_lengths() {
        let cases = [
            ("CBF43926", HashAlgorithm::Crc32),
            ("995DC9BBDF1939FA", HashAlgorithm::Crc64),
            ("a9993e364706816aba3e25717850c26c9cd0d89d", HashAlgorithm::Sha1),
            (
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
                HashAlgorithm::Sha256,
            ),
        ];
        for (etag, expected) in cases {
            let h = headers(&[("etag", etag)]);
            let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
            assert_eq!(target.key, etag.to_ascii_lowercase());
            assert!(matches!(
                target.mode,
                ValidationMode::HashBased { algorithm, .. } if algorithm == expected
            ));
        }
    }

    #[test]
    fn test_unsupported_or_malformed_etag_is_uncached() {
        for etag in ["\"abcdef\"", "\"abc\"", "\"not-hex-at-all-zz\"", "\"\""] {
            let h = headers(&[("etag", etag)]);
            assert_eq!(
                resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false),
                None,
                "etag {etag}"
            );
        }
    }

    #[test]
    fn test_content_md5_hex_and_base64() {
        let hex_form = headers(&[("content-md5", "D41D8CD98F00B204E9800998ECF8427E")]);
        let b64_form = headers(&[("content-md5", "1B2M2Y8AsgTpgAmY7PhCfg==")]);

        let a = resolve_cache_target(&hex_form, &url(), now(), TEN_MINUTES, false).unwrap();
        let b = resolve_cache_target(&b64_form, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(a.key, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_md5_wins_over_etag() {
        let h = headers(&[
            ("content-md5", "1B2M2Y8AsgTpgAmY7PhCfg=="),
            (
                "etag",
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            ),
        ]);
        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(target.key, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_content_md5_base64_with_leading_symbol() {
        let digest = [0xfbu8; 16];
        let encoded = base64::engine::general_purpose::STANDARD.encode(digest);
        assert!(encoded.starts_with('+'));

        let h = headers(&[("content-md5", encoded.as_str())]);
        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(target.key, hex::encode(digest));
    }

    #[test]
    fn test_bad_content_md5_falls_through_to_etag() {
        let h = headers(&[("content-md5", "%%%"), ("etag", "\"CBF43926\"")]);
        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(target.key, "cbf43926");
    }

    #[test]
    fn test_expires_is_clamped() {
        let date = http_date(now() + Duration::from_secs(3600));
        let h = headers(&[("expires", date.as_str())]);
        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(target.key, url_cache_key(&url()));
        assert_eq!(target.expires_at(), Some(now() + TEN_MINUTES));
    }

    #[test]
    fn test_expires_within_ceiling_is_kept() {
        let expiry = now() + Duration::from_secs(120);
        let date = http_date(expiry);
        let h = headers(&[("expires", date.as_str())]);
        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false).unwrap();
        assert_eq!(target.expires_at(), Some(expiry));
    }

    #[test]
    fn test_past_expiry_is_uncached() {
        let date = http_date(now() - Duration::from_secs(1));
        let h = headers(&[("expires", date.as_str())]);
        assert_eq!(
            resolve_cache_target(&h, &url(), now(), TEN_MINUTES, true),
            None
        );
    }

    #[test]
    fn test_missing_expires_depends_on_aggressive_mode() {
        let h = HeaderMap::new();
        assert_eq!(
            resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false),
            None
        );

        let target = resolve_cache_target(&h, &url(), now(), TEN_MINUTES, true).unwrap();
        assert_eq!(target.expires_at(), Some(now() + TEN_MINUTES));
    }

    #[test]
    fn test_huge_max_expire_saturates() {
        let h = HeaderMap::new();
        let target = resolve_cache_target(&h, &url(), now(), Duration::MAX, true).unwrap();
        assert_eq!(target.expires_at(), Some(crate::clock::far_future()));

        let date = http_date(now() + Duration::from_secs(3600));
        let h = headers(&[("expires", date.as_str())]);
        let target = resolve_cache_target(&h, &url(), now(), Duration::MAX, false).unwrap();
        assert_eq!(target.expires_at(), Some(now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_garbage_expires_is_not_fatal() {
        let h = headers(&[("expires", "0")]);
        assert_eq!(
            resolve_cache_target(&h, &url(), now(), TEN_MINUTES, false),
            None
        );
    }

    #[test]
    fn test_url_key_is_stable_hex() {
        let key = url_cache_key(&url());
        assert_eq!(key.len(), 16);
        assert!(key.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(key, url_cache_key(&url()));
        assert_ne!(
            key,
            url_cache_key(&Url::parse("https://cdn.example/b.bin").unwrap())
        );
    }
}
