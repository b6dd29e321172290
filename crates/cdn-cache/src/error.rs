use reqwest::StatusCode;

/// Errors surfaced by the CDN cache.
///
/// Cache-side anomalies (corrupt entries, failed writes, undecodable
/// validators) never show up here: they degrade to uncached service instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Malformed status record: {0}")]
    MalformedRecord(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl CacheError {
    /// Whether the error came from the caller's cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }
}
