//! [`StorageBackend`] over an OpenDAL [`Operator`]
//!
//! Publication semantics come from the service: the memory service and S3
//! only create the object when the writer closes; the fs service does the
//! same when the operator is built with an atomic write dir (see
//! [`crate::operator::build_operator`]).

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lockbox_core::{AbsoluteLocation, BackendError};
use opendal::{ErrorKind, Operator};

use crate::backend::{BackendSink, BackendSource, LocationStream, StorageBackend};

/// Bytes requested from the service per `next_chunk` call.
const READ_CHUNK_SIZE: u64 = 256 * 1024;

/// Translate an OpenDAL error without reinterpreting it. Only the operation
/// and error kind are kept: service messages embed object paths.
fn map_err(op: &'static str, err: opendal::Error) -> BackendError {
    let message = format!("{op} failed ({})", err.kind());
    let mapped = if err.kind() == ErrorKind::NotFound {
        BackendError::not_found(message)
    } else {
        BackendError::other(message)
    };
    mapped.with_retryable(err.is_temporary())
}

#[derive(Clone)]
pub struct OpendalBackend {
    op: Operator,
}

impl OpendalBackend {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }
}

#[async_trait]
impl StorageBackend for OpendalBackend {
    async fn write(&self, location: &AbsoluteLocation) -> Result<Box<dyn BackendSink>, BackendError> {
        let writer = self
            .op
            .writer(location.as_str())
            .await
            .map_err(|e| map_err("open writer", e))?;
        Ok(Box::new(OpendalSink {
            writer: Some(writer),
        }))
    }

    async fn read(&self, location: &AbsoluteLocation) -> Result<Box<dyn BackendSource>, BackendError> {
        let meta = self
            .op
            .stat(location.as_str())
            .await
            .map_err(|e| map_err("stat", e))?;
        if meta.is_dir() {
            return Err(BackendError::not_found("read failed (location is a directory)"));
        }

        let reader = self
            .op
            .reader(location.as_str())
            .await
            .map_err(|e| map_err("open reader", e))?;
        Ok(Box::new(OpendalSource {
            reader,
            offset: 0,
            size: meta.content_length(),
        }))
    }

    async fn list(&self, prefix: &AbsoluteLocation) -> Result<LocationStream, BackendError> {
        let lister = match self.op.lister_with(&prefix.as_dir()).recursive(true).await {
            Ok(lister) => lister,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(futures::stream::empty().boxed())
            }
            Err(e) => return Err(map_err("list", e)),
        };

        let stream = lister.filter_map(|entry| async move {
            match entry {
                Ok(entry) if entry.metadata().is_file() => {
                    Some(Ok(AbsoluteLocation::new(entry.path())))
                }
                Ok(_) => None,
                Err(e) => Some(Err(map_err("list", e))),
            }
        });
        Ok(stream.boxed())
    }

    async fn delete(&self, location: &AbsoluteLocation) -> Result<(), BackendError> {
        match self.op.delete(location.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_err("delete", e)),
        }
    }
}

struct OpendalSink {
    /// `None` once committed or aborted.
    writer: Option<opendal::Writer>,
}

#[async_trait]
impl BackendSink for OpendalSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), BackendError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| BackendError::other("write failed (sink already finished)"))?;
        writer.write(chunk).await.map_err(|e| map_err("write", e))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), BackendError> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| BackendError::other("commit failed (sink already finished)"))?;
        if let Err(e) = writer.close().await {
            if let Err(abort_err) = writer.abort().await {
                tracing::warn!(error = %abort_err.kind(), "abort after failed commit also failed");
            }
            return Err(map_err("commit", e));
        }
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<(), BackendError> {
        match self.writer.take() {
            Some(mut writer) => writer.abort().await.map_err(|e| map_err("abort", e)),
            None => Ok(()),
        }
    }
}

impl Drop for OpendalSink {
    fn drop(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        // Nothing was published; abort only cleans up staged data.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = writer.abort().await {
                    tracing::debug!(error = %e.kind(), "abort of dropped sink failed");
                }
            });
        }
    }
}

struct OpendalSource {
    reader: opendal::Reader,
    offset: u64,
    size: u64,
}

#[async_trait]
impl BackendSource for OpendalSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BackendError> {
        if self.offset >= self.size {
            return Ok(None);
        }
        let end = (self.offset + READ_CHUNK_SIZE).min(self.size);
        let bytes = self
            .reader
            .read(self.offset..end)
            .await
            .map_err(|e| map_err("read", e))?
            .to_bytes();
        if bytes.is_empty() {
            return Err(BackendError::other("read failed (object shorter than its metadata)"));
        }
        self.offset += bytes.len() as u64;
        Ok(Some(bytes))
    }
}
