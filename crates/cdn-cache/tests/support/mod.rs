//! In-memory CDN used by the integration tests.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use cdn_cache::{CacheError, CdnRequest, CdnResponse, CdnTransport};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::Barrier;

#[derive(Clone)]
struct Route {
    headers: HeaderMap,
    body: Bytes,
}

#[derive(Default)]
pub struct MockCdn {
    routes: Mutex<HashMap<String, Route>>,
    gate: Mutex<Option<Arc<Barrier>>>,
    requests: AtomicUsize,
}

impl MockCdn {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `body` at `url` with the given headers plus Content-Length
    pub fn route(&self, url: &str, headers: &[(&'static str, String)], body: &'static [u8]) {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.routes.lock().insert(
            url.to_string(),
            Route {
                headers: map,
                body: Bytes::from_static(body),
            },
        );
    }

    /// Hold every body until `parties` bodies are being read at once
    pub fn gate_bodies(&self, parties: usize) {
        *self.gate.lock() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CdnTransport for MockCdn {
    async fn send(&self, request: CdnRequest) -> Result<CdnResponse, CacheError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let Some(route) = self.routes.lock().get(request.url.as_str()).cloned() else {
            return Ok(CdnResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: futures::stream::empty().boxed(),
            });
        };

        let gate = self.gate.lock().clone();
        let body = route.body;
        let stream = futures::stream::once(async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            Ok::<_, io::Error>(body)
        });

        Ok(CdnResponse {
            status: StatusCode::OK,
            headers: route.headers,
            body: stream.boxed(),
        })
    }
}
