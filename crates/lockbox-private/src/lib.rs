//! lockbox-private: the per-user encrypted private store
//!
//! [`PrivateStore`] is the caller-facing surface: `write`, `read`, `list`
//! and `remove`, each taking a [`UserAuth`] issued by the
//! [`ProfileStore`]. Documents are sealed with the user's document key before
//! they reach the backend, and their path names are encrypted too.
//!
//! [`Lockbox`] wires both stores over one backend from a [`LockboxConfig`].

pub mod handles;
pub mod resolver;
pub mod store;

use std::sync::Arc;

use lockbox_core::config::LockboxConfig;
use lockbox_core::{LockboxError, LockboxResult};
use lockbox_crypto::SegmentSize;
use lockbox_storage::StorageBackend;

pub use handles::{ScopedReadHandle, ScopedWriteHandle};
pub use lockbox_profile::{ProfileStore, UserAuth};
pub use resolver::PathResolver;
pub use store::{PrivateStore, ResourceRef};

/// Profile store and private store sharing one backend.
pub struct Lockbox {
    profiles: Arc<ProfileStore>,
    private: PrivateStore,
}

impl Lockbox {
    pub fn new(config: &LockboxConfig, backend: Arc<dyn StorageBackend>) -> LockboxResult<Self> {
        config.validate()?;
        let segment_size = SegmentSize::new(config.crypto.segment_size)
            .map_err(|e| LockboxError::Config(format!("crypto.segment_size: {e}")))?;

        let profiles = Arc::new(ProfileStore::from_config(config, backend));
        let private = PrivateStore::new(profiles.clone(), segment_size);
        Ok(Self { profiles, private })
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn private(&self) -> &PrivateStore {
        &self.private
    }
}
