//! Chunked download stream
//!
//! Pull-based byte sequence over a backing object. Chunks are produced on
//! demand, one `read_range` per `next_chunk` call, so a slow consumer never
//! forces buffering beyond a single chunk. Cancellation stops the producer
//! before its next read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::Stream;
use tracing::debug;

use crate::client::ObjectClient;
use crate::error::{Result, StorageError};
use crate::types::FileMetadata;

/// Default chunk size for streamed downloads: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Inclusive byte range restriction for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Cancellation handle for a running download.
///
/// Cloneable and cheap; flipping it stops the stream before its next chunk
/// read without tearing down the client handle.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lazily-produced byte sequence over one object.
pub struct DownloadStream {
    client: Arc<dyn ObjectClient>,
    key: String,
    metadata: FileMetadata,
    /// Next byte offset to read.
    position: u64,
    /// One past the last byte to read.
    limit: u64,
    chunk_size: usize,
    cancel: CancelHandle,
}

impl DownloadStream {
    pub(crate) fn new(
        client: Arc<dyn ObjectClient>,
        key: String,
        metadata: FileMetadata,
        range: Option<ByteRange>,
        chunk_size: usize,
    ) -> Result<Self> {
        let size = metadata.content_length;
        let (position, limit) = match range {
            Some(range) => {
                if range.start > range.end || range.start >= size {
                    return Err(StorageError::Download {
                        path: key,
                        source: Box::new(StorageError::Backend(format!(
                            "byte range {}-{} out of bounds for object of {} bytes",
                            range.start, range.end, size
                        ))),
                    });
                }
                (range.start, range.end.min(size.saturating_sub(1)) + 1)
            }
            None => (0, size),
        };

        Ok(Self {
            client,
            key,
            metadata,
            position,
            limit,
            chunk_size: chunk_size.max(1),
            cancel: CancelHandle::default(),
        })
    }

    /// Metadata of the object being streamed.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Bytes not yet produced.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.position)
    }

    /// Handle that cancels this stream from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Produce the next chunk, or `None` once the sequence is complete or
    /// the stream was cancelled.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.cancel.is_cancelled() {
            debug!(key = %self.key, "download cancelled, closing stream");
            self.position = self.limit;
            return Ok(None);
        }
        if self.position >= self.limit {
            return Ok(None);
        }

        let end = (self.position + self.chunk_size as u64 - 1).min(self.limit - 1);
        let chunk = self
            .client
            .read_range(&self.key, self.position, end)
            .await
            .map_err(|e| StorageError::Download {
                path: self.key.clone(),
                source: Box::new(e),
            })?;

        if chunk.is_empty() {
            // Backend returned less than asked; treat as end of object.
            self.position = self.limit;
            return Ok(None);
        }

        self.position += chunk.len() as u64;
        Ok(Some(chunk))
    }

    /// Adapt into a `futures::Stream` of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> {
        futures::stream::try_unfold(self, |mut stream| async move {
            match stream.next_chunk().await? {
                Some(chunk) => Ok(Some((chunk, stream))),
                None => Ok(None),
            }
        })
    }
}
