//! # Network Transport
//!
//! The cache never talks to the network directly. It issues [`CdnRequest`]s
//! through a [`CdnTransport`] and reads the body of the returned
//! [`CdnResponse`] as a byte stream. [`ReqwestTransport`] is the default
//! implementation; tests plug in their own.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Client, Method, StatusCode};
use rustls::{ClientConfig, crypto::aws_lc_rs};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::debug;
use url::Url;

use crate::config::TransportConfig;
use crate::error::CacheError;

/// A boxed stream of body chunks
pub type BoxByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// An outgoing request
#[derive(Debug, Clone)]
pub struct CdnRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl CdnRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn head(url: Url) -> Self {
        Self {
            method: Method::HEAD,
            url,
            headers: HeaderMap::new(),
        }
    }
}

/// A response whose headers have arrived and whose body is still streaming
pub struct CdnResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxByteStream,
}

impl CdnResponse {
    /// Content length as announced by the `Content-Length` header.
    ///
    /// Read from the header rather than the body so HEAD responses report
    /// the size of the resource.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

impl fmt::Debug for CdnResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Capability to send a request and receive a streaming response.
///
/// Implementations return once headers are available. Any status code is a
/// successful send; only connection-level problems are errors.
#[async_trait]
pub trait CdnTransport: Send + Sync {
    async fn send(&self, request: CdnRequest) -> Result<CdnResponse, CacheError>;
}

#[async_trait]
impl<T: CdnTransport + ?Sized> CdnTransport for Arc<T> {
    async fn send(&self, request: CdnRequest) -> Result<CdnResponse, CacheError> {
        (**self).send(request).await
    }
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, CacheError> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CacheError::Transport(format!("TLS protocol setup failed: {e}")))?
        .with_platform_verifier()
        .map_err(|e| CacheError::Transport(format!("Platform verifier unavailable: {e}")))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(8)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    client_builder.build().map_err(CacheError::from)
}

/// [`CdnTransport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, CacheError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CdnTransport for ReqwestTransport {
    async fn send(&self, request: CdnRequest) -> Result<CdnResponse, CacheError> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(io::Error::other).boxed();

        Ok(CdnResponse {
            status,
            headers,
            body,
        })
    }
}
