//! Scoped streaming handles returned by [`PrivateStore`](crate::PrivateStore)
//!
//! A write handle publishes only on [`ScopedWriteHandle::close`]. Any other
//! exit (an error, an explicit abort, or simply dropping the handle) aborts the
//! backend sink, so no partial envelope ever becomes visible. Closing also
//! re-checks the profile under the user's lock: a handle that outlives its
//! profile aborts instead of publishing into a purged tree.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use lockbox_core::{BackendError, LockboxResult, ResolvedResource};
use lockbox_crypto::{EnvelopeOpener, EnvelopeSealer};
use lockbox_profile::{crypto_error, ProfileStore, UserAuth};
use lockbox_storage::{BackendSink, BackendSource};

pub struct ScopedWriteHandle {
    resource: ResolvedResource,
    profiles: Arc<ProfileStore>,
    auth: UserAuth,
    /// Both `None` once the handle is closed or aborted.
    sink: Option<Box<dyn BackendSink>>,
    sealer: Option<EnvelopeSealer>,
}

impl ScopedWriteHandle {
    pub(crate) fn new(
        resource: ResolvedResource,
        profiles: Arc<ProfileStore>,
        auth: UserAuth,
        sink: Box<dyn BackendSink>,
        sealer: EnvelopeSealer,
    ) -> Self {
        Self {
            resource,
            profiles,
            auth,
            sink: Some(sink),
            sealer: Some(sealer),
        }
    }

    /// Where the document will be published.
    pub fn resource(&self) -> &ResolvedResource {
        &self.resource
    }

    /// Encrypt and forward `data`. On failure the write is aborted and the
    /// handle rejects further use.
    pub async fn write(&mut self, data: &[u8]) -> LockboxResult<()> {
        let (Some(sink), Some(sealer)) = (self.sink.as_mut(), self.sealer.as_mut()) else {
            return Err(BackendError::other("write handle is no longer open").into());
        };

        let result: LockboxResult<()> = match sealer.update(data) {
            Ok(ciphertext) if ciphertext.is_empty() => Ok(()),
            Ok(ciphertext) => sink.write(Bytes::from(ciphertext)).await.map_err(Into::into),
            Err(e) => Err(crypto_error(e)),
        };
        if result.is_err() {
            self.discard().await;
        }
        result
    }

    /// Seal the final segment and publish the envelope. Fails with
    /// `RevokedAuth`, publishing nothing, if the profile was removed since
    /// the handle was opened.
    pub async fn close(mut self) -> LockboxResult<ResolvedResource> {
        let (Some(mut sink), Some(sealer)) = (self.sink.take(), self.sealer.take()) else {
            return Err(BackendError::other("write handle is no longer open").into());
        };

        let tail = match sealer.finish() {
            Ok(tail) => tail,
            Err(e) => {
                abort_quietly(sink).await;
                return Err(crypto_error(e));
            }
        };
        if let Err(e) = sink.write(Bytes::from(tail)).await {
            abort_quietly(sink).await;
            return Err(e.into());
        }

        let current = match self.profiles.lock_current(&self.auth).await {
            Ok(current) => current,
            Err(e) => {
                abort_quietly(sink).await;
                return Err(e);
            }
        };
        sink.commit().await?;
        drop(current);

        tracing::debug!("envelope published");
        Ok(self.resource.clone())
    }

    /// Discard everything written so far.
    pub async fn abort(mut self) -> LockboxResult<()> {
        self.sealer = None;
        match self.sink.take() {
            Some(sink) => sink.abort().await.map_err(Into::into),
            None => Ok(()),
        }
    }

    async fn discard(&mut self) {
        self.sealer = None;
        if let Some(sink) = self.sink.take() {
            abort_quietly(sink).await;
        }
    }
}

impl Drop for ScopedWriteHandle {
    fn drop(&mut self) {
        if self.sink.is_some() {
            // The sink aborts itself when dropped uncommitted.
            tracing::debug!("write handle dropped before close; aborting");
        }
    }
}

async fn abort_quietly(sink: Box<dyn BackendSink>) {
    if let Err(e) = sink.abort().await {
        tracing::warn!(error = %e, "aborting backend write failed");
    }
}

pub struct ScopedReadHandle {
    resource: ResolvedResource,
    /// Both `None` once the envelope is exhausted or failed.
    source: Option<Box<dyn BackendSource>>,
    opener: Option<EnvelopeOpener>,
}

impl ScopedReadHandle {
    pub(crate) fn new(
        resource: ResolvedResource,
        source: Box<dyn BackendSource>,
        opener: EnvelopeOpener,
    ) -> Self {
        Self {
            resource,
            source: Some(source),
            opener: Some(opener),
        }
    }

    pub fn resource(&self) -> &ResolvedResource {
        &self.resource
    }

    /// Next run of authenticated plaintext, `None` at the end.
    ///
    /// Only segments whose tag verified are ever returned. After an error the
    /// handle is released and yields `None`.
    pub async fn next_chunk(&mut self) -> LockboxResult<Option<Bytes>> {
        loop {
            let (Some(source), Some(opener)) = (self.source.as_mut(), self.opener.as_mut()) else {
                return Ok(None);
            };

            let ciphertext = match source.next_chunk().await {
                Ok(Some(ciphertext)) => ciphertext,
                Ok(None) => return self.finish(),
                Err(e) => {
                    self.release();
                    return Err(e.into());
                }
            };

            match opener.update(&ciphertext) {
                Ok(plain) if plain.is_empty() => continue,
                Ok(plain) => return Ok(Some(Bytes::from(plain))),
                Err(e) => {
                    self.release();
                    return Err(crypto_error(e));
                }
            }
        }
    }

    /// Read the whole document. Nothing is returned unless all of it verifies.
    pub async fn read_to_end(mut self) -> LockboxResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// The handle as a stream of plaintext chunks; ends after the first error.
    pub fn into_stream(self) -> BoxStream<'static, LockboxResult<Bytes>> {
        futures::stream::unfold(self, |mut handle| async move {
            match handle.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), handle)),
                Ok(None) => None,
                Err(e) => Some((Err(e), handle)),
            }
        })
        .boxed()
    }

    fn finish(&mut self) -> LockboxResult<Option<Bytes>> {
        self.source = None;
        let Some(opener) = self.opener.take() else {
            return Ok(None);
        };
        let plain = opener.finish().map_err(crypto_error)?;
        if plain.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::from(plain)))
        }
    }

    fn release(&mut self) {
        self.source = None;
        self.opener = None;
    }
}
