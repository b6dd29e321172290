//! # Response Bodies
//!
//! [`CdnBody`] is what callers read, whether the bytes come from disk, the
//! network, or the network while being persisted. For write-through bodies
//! the read loop decides the cache entry's fate: reaching the end commits it,
//! an error or cancellation discards it.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cache::{WriteOutcome, WriteThroughWriter};
use crate::error::CacheError;
use crate::transport::BoxByteStream;

/// Where a body's bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOrigin {
    /// Served from a validated cache entry
    Cache,
    /// Streamed from the network without persistence
    Network,
    /// Streamed from the network and persisted as it is read
    WriteThrough,
}

/// A response body being read by the caller.
///
/// A write-through entry is committed when the stream ends, or earlier once
/// `content_length` bytes have been persisted. Dropping the body or
/// cancelling before that point discards the entry.
pub struct CdnBody {
    stream: BoxByteStream,
    writer: Option<WriteThroughWriter>,
    origin: BodyOrigin,
    content_length: Option<u64>,
    cancel: CancellationToken,
    done: bool,
}

impl CdnBody {
    pub(crate) fn cached(file: File, len: Option<u64>, cancel: CancellationToken) -> Self {
        Self {
            stream: ReaderStream::new(file).boxed(),
            writer: None,
            origin: BodyOrigin::Cache,
            content_length: len,
            cancel,
            done: false,
        }
    }

    pub(crate) fn network(
        stream: BoxByteStream,
        content_length: Option<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            writer: None,
            origin: BodyOrigin::Network,
            content_length,
            cancel,
            done: false,
        }
    }

    pub(crate) fn write_through(
        stream: BoxByteStream,
        writer: WriteThroughWriter,
        content_length: Option<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            writer: Some(writer),
            origin: BodyOrigin::WriteThrough,
            content_length,
            cancel,
            done: false,
        }
    }

    pub fn origin(&self) -> BodyOrigin {
        self.origin
    }

    pub fn is_cached(&self) -> bool {
        self.origin == BodyOrigin::Cache
    }

    /// Body length if known up front
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the next chunk, `None` at the end of the body.
    ///
    /// After the end, an error or cancellation every further call returns
    /// `Ok(None)`.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, CacheError> {
        if self.done {
            return Ok(None);
        }

        let next = {
            let cancel = &self.cancel;
            let stream = &mut self.stream;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = stream.next() => Some(item),
            }
        };

        match next {
            None => {
                self.finish(WriteOutcome::Cancelled).await;
                Err(CacheError::Cancelled)
            }
            Some(None) => {
                self.finish(WriteOutcome::Completed).await;
                Ok(None)
            }
            Some(Some(Err(e))) => {
                self.finish(WriteOutcome::Failed).await;
                Err(CacheError::IoError(e))
            }
            Some(Some(Ok(bytes))) => {
                self.tee(&bytes).await;
                Ok(Some(bytes))
            }
        }
    }

    async fn tee(&mut self, bytes: &Bytes) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writer.write(bytes).await {
            // Keep serving the caller; only the cache entry is lost.
            warn!(key = writer.key(), error = %e, "Cache write failed, continuing uncached");
            if let Some(writer) = self.writer.take() {
                writer.finalize(WriteOutcome::Failed).await;
            }
            return;
        }

        // The announced length is complete even if the caller never polls
        // for the end of the stream.
        if self.content_length == Some(writer.bytes_written()) {
            if let Some(writer) = self.writer.take() {
                writer.finalize(WriteOutcome::Completed).await;
            }
        }
    }

    async fn finish(&mut self, outcome: WriteOutcome) {
        self.done = true;
        self.stream = futures::stream::empty().boxed();
        if let Some(writer) = self.writer.take() {
            writer.finalize(outcome).await;
        }
    }

    /// Read the whole body into memory
    pub async fn bytes(mut self) -> Result<Bytes, CacheError> {
        let capacity = self
            .content_length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Copy the whole body into `writer`, returning the byte count
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> Result<u64, CacheError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut total = 0u64;
        while let Some(chunk) = self.chunk().await? {
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(total)
    }

    /// Adapt into a stream of chunks
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, CacheError>> + Send {
        futures::stream::unfold(self, |mut body| async move {
            match body.chunk().await {
                Ok(Some(bytes)) => Some((Ok(bytes), body)),
                Ok(None) => None,
                Err(e) => Some((Err(e), body)),
            }
        })
    }

    /// Adapt into an `AsyncRead`
    pub fn into_async_read(self) -> impl AsyncRead + Send {
        let stream = self.into_stream().map_err(|e| match e {
            CacheError::IoError(e) => e,
            other => io::Error::other(other),
        });
        StreamReader::new(Box::pin(stream))
    }
}

impl fmt::Debug for CdnBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnBody")
            .field("origin", &self.origin)
            .field("content_length", &self.content_length)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
