//! Private-store façade: encrypted write, read, list and remove

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use lockbox_core::redact::{secure, secure_path};
use lockbox_core::{LockboxError, LockboxResult, PrivatePath, ResolvedResource};
use lockbox_crypto::{EnvelopeOpener, EnvelopeSealer, SegmentSize};
use lockbox_profile::{ProfileStore, UserAuth};
use lockbox_storage::StorageBackend;
use tracing::{debug, warn};

use crate::handles::{ScopedReadHandle, ScopedWriteHandle};
use crate::resolver::PathResolver;

/// What a read or remove targets: a logical path, or a resource that an
/// earlier `write` or `list` already resolved.
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef<'a> {
    Path(&'a PrivatePath),
    Resolved(&'a ResolvedResource),
}

impl<'a> From<&'a PrivatePath> for ResourceRef<'a> {
    fn from(path: &'a PrivatePath) -> Self {
        ResourceRef::Path(path)
    }
}

impl<'a> From<&'a ResolvedResource> for ResourceRef<'a> {
    fn from(resource: &'a ResolvedResource) -> Self {
        ResourceRef::Resolved(resource)
    }
}

pub struct PrivateStore {
    profiles: Arc<ProfileStore>,
    resolver: PathResolver,
    segment_size: SegmentSize,
}

impl PrivateStore {
    pub fn new(profiles: Arc<ProfileStore>, segment_size: SegmentSize) -> Self {
        let resolver = PathResolver::new(profiles.layout().clone());
        Self {
            profiles,
            resolver,
            segment_size,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    fn backend(&self) -> &dyn StorageBackend {
        self.profiles.backend().as_ref()
    }

    /// Open an encrypted write to `path`, replacing any existing document
    /// once the handle is closed.
    pub async fn write(&self, auth: &UserAuth, path: &PrivatePath) -> LockboxResult<ScopedWriteHandle> {
        self.profiles.verify(auth).await?;
        if path.is_root() {
            return Err(LockboxError::invalid_path("the private root is not a document"));
        }

        let resource = self.resolver.resolve(auth, path)?;
        let sink = self.backend().write(&resource.location).await?;
        let sealer = EnvelopeSealer::new(auth.document_key(), self.segment_size);

        debug!(
            user = %secure(auth.user().as_str()),
            path = %secure_path(path.to_string()),
            "write opened"
        );
        Ok(ScopedWriteHandle::new(
            resource,
            self.profiles.clone(),
            auth.clone(),
            sink,
            sealer,
        ))
    }

    /// Open a decrypting read. A resource that does not belong to `auth`'s
    /// user is reported as `NotFound` without touching its contents.
    pub async fn read<'a>(
        &self,
        auth: &UserAuth,
        resource: impl Into<ResourceRef<'a>>,
    ) -> LockboxResult<ScopedReadHandle> {
        self.profiles.verify(auth).await?;
        let resource = self.target(auth, resource.into())?;

        let source = self
            .backend()
            .read(&resource.location)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    LockboxError::NotFound { what: "resource" }
                } else {
                    e.into()
                }
            })?;

        debug!(
            user = %secure(auth.user().as_str()),
            path = %secure_path(resource.logical.to_string()),
            "read opened"
        );
        let opener = EnvelopeOpener::new(auth.document_key());
        Ok(ScopedReadHandle::new(resource, source, opener))
    }

    /// Every document at or below the folder `prefix`, lazily. Each call
    /// enumerates the backend afresh; order is whatever the backend yields.
    pub async fn list(
        &self,
        auth: &UserAuth,
        prefix: &PrivatePath,
    ) -> LockboxResult<BoxStream<'static, LockboxResult<ResolvedResource>>> {
        self.profiles.verify(auth).await?;
        let dir = self.resolver.resolve(auth, prefix)?.location;
        let entries = self.backend().list(&dir).await?;

        let auth = auth.clone();
        let resolver = self.resolver.clone();
        let prefix = prefix.clone();
        let stream = entries.filter_map(move |entry| {
            let item = match entry {
                Err(e) => Some(Err(e.into())),
                Ok(location) => match resolver.logical_path(&auth, &location) {
                    Ok(Some(logical)) if logical.starts_with(&prefix) => {
                        Some(Ok(ResolvedResource { logical, location }))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "skipping entry whose name does not decrypt");
                        None
                    }
                },
            };
            futures::future::ready(item)
        });
        Ok(stream.boxed())
    }

    /// Delete a document. Deleting one that does not exist succeeds.
    pub async fn remove<'a>(
        &self,
        auth: &UserAuth,
        resource: impl Into<ResourceRef<'a>>,
    ) -> LockboxResult<()> {
        self.profiles.verify(auth).await?;
        let resource = match self.target(auth, resource.into()) {
            Ok(resource) => resource,
            // Not this user's, so there is nothing of theirs to remove.
            Err(LockboxError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };
        if resource.logical.is_root() {
            return Err(LockboxError::invalid_path("the private root is not a document"));
        }

        self.backend().delete(&resource.location).await?;
        debug!(
            user = %secure(auth.user().as_str()),
            path = %secure_path(resource.logical.to_string()),
            "removed"
        );
        Ok(())
    }

    fn target(&self, auth: &UserAuth, resource: ResourceRef<'_>) -> LockboxResult<ResolvedResource> {
        match resource {
            ResourceRef::Path(path) => self.resolver.resolve(auth, path),
            ResourceRef::Resolved(resolved) => {
                if self.resolver.owns(auth, resolved)? {
                    Ok(resolved.clone())
                } else {
                    Err(LockboxError::NotFound { what: "resource" })
                }
            }
        }
    }
}
