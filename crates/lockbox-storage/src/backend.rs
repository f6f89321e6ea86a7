//! Storage backend interface
//!
//! A backend stores opaque byte objects at [`AbsoluteLocation`]s. It knows
//! nothing about users, keys or envelopes. The contract lockbox relies on:
//!
//! - an object written through a [`BackendSink`] becomes visible to readers
//!   only when [`BackendSink::commit`] succeeds, and replaces any previous
//!   object at that location as a whole;
//! - a sink that is aborted or dropped before `commit` publishes nothing;
//! - `delete` of a missing object succeeds;
//! - a read of a missing object fails with [`BackendErrorKind::NotFound`].
//!
//! [`BackendErrorKind::NotFound`]: lockbox_core::BackendErrorKind::NotFound

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use lockbox_core::{AbsoluteLocation, BackendError};

/// Lazily produced object locations, as returned by [`StorageBackend::list`].
pub type LocationStream = BoxStream<'static, Result<AbsoluteLocation, BackendError>>;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a sink that will replace the object at `location` on commit.
    async fn write(&self, location: &AbsoluteLocation) -> Result<Box<dyn BackendSink>, BackendError>;

    /// Open the object at `location` for sequential reading.
    async fn read(&self, location: &AbsoluteLocation) -> Result<Box<dyn BackendSource>, BackendError>;

    /// Every object below the directory `prefix`, at any depth. A prefix
    /// with nothing under it yields an empty stream.
    async fn list(&self, prefix: &AbsoluteLocation) -> Result<LocationStream, BackendError>;

    /// Remove the object at `location`. Missing objects are not an error.
    async fn delete(&self, location: &AbsoluteLocation) -> Result<(), BackendError>;
}

#[async_trait]
pub trait BackendSink: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<(), BackendError>;

    /// Publish everything written so far as one object.
    async fn commit(self: Box<Self>) -> Result<(), BackendError>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<(), BackendError>;
}

#[async_trait]
pub trait BackendSource: Send {
    /// Next chunk of the object, `None` at end of object.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BackendError>;
}
