//! Profile store: registration, unlock, password rotation, removal

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::TryStreamExt;
use lockbox_core::config::LockboxConfig;
use lockbox_core::redact::secure;
use lockbox_core::{LockboxError, LockboxResult, UserId, UserPassword};
use lockbox_crypto::{derive_path_key, generate_document_key, DocumentKey, KdfParams, PathKey};
use lockbox_storage::StorageBackend;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::crypto_error;
use crate::keyring::KeyringDocument;
use crate::layout::DfsLayout;
use crate::profile::Profile;
use crate::record::{read_record, write_record};

/// Capability for one user's private store, issued by [`ProfileStore`].
///
/// Holds the unwrapped keys in memory only. Cheap to clone; the keys are
/// zeroized when the last clone drops. Valid only while the profile it was
/// issued against still exists.
#[derive(Clone)]
pub struct UserAuth {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    profile: Profile,
    document_key: DocumentKey,
    path_key: PathKey,
}

impl UserAuth {
    fn new(profile: Profile, document_key: DocumentKey) -> LockboxResult<Self> {
        let path_key = derive_path_key(&document_key).map_err(crypto_error)?;
        Ok(Self {
            inner: Arc::new(AuthInner {
                profile,
                document_key,
                path_key,
            }),
        })
    }

    pub fn user(&self) -> &UserId {
        &self.inner.profile.user_id
    }

    /// The profile as it was when this capability was issued.
    pub fn profile(&self) -> &Profile {
        &self.inner.profile
    }

    pub fn profile_id(&self) -> Uuid {
        self.inner.profile.profile_id
    }

    pub fn document_key(&self) -> &DocumentKey {
        &self.inner.document_key
    }

    pub fn path_key(&self) -> &PathKey {
        &self.inner.path_key
    }
}

impl std::fmt::Debug for UserAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAuth")
            .field("user", &secure(self.user().as_str()))
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// One async mutex per user id, so register/update/remove for the same
/// user never interleave.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    fn lock_for(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries nobody holds can go; clones are only taken under this guard.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(user.clone()).or_default().clone()
    }
}

/// A profile verified current for some [`UserAuth`], held under the user's
/// lock. Until it drops, the profile cannot be removed, replaced or rotated.
pub struct CurrentProfile {
    profile: Profile,
    _guard: OwnedMutexGuard<()>,
}

impl CurrentProfile {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

pub struct ProfileStore {
    backend: Arc<dyn StorageBackend>,
    layout: DfsLayout,
    kdf: KdfParams,
    locks: UserLocks,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn StorageBackend>, layout: DfsLayout, kdf: KdfParams) -> Self {
        Self {
            backend,
            layout,
            kdf,
            locks: UserLocks::default(),
        }
    }

    pub fn from_config(config: &LockboxConfig, backend: Arc<dyn StorageBackend>) -> Self {
        let kdf = KdfParams {
            mem_cost_kib: config.crypto.argon2_mem_cost_kib,
            time_cost: config.crypto.argon2_time_cost,
            parallelism: config.crypto.argon2_parallelism,
        };
        Self::new(backend, DfsLayout::from_config(&config.layout), kdf)
    }

    pub fn layout(&self) -> &DfsLayout {
        &self.layout
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Create a profile and keyring for `user` with a fresh document key.
    pub async fn register(&self, user: &UserId, password: &UserPassword) -> LockboxResult<UserAuth> {
        let lock = self.locks.lock_for(user);
        let _guard = lock.lock().await;

        if self.read_profile(user).await?.is_some() {
            return Err(LockboxError::AlreadyExists);
        }

        let profile = Profile::generate(user, &self.layout);
        let document_key = generate_document_key();
        let keyring = {
            let (user, password, key, params) =
                (user.clone(), password.clone(), document_key.clone(), self.kdf.clone());
            run_kdf(move || KeyringDocument::seal(&user, &password, &key, &params)).await?
        };

        // The profile is the commit point: a keyring without one is unreachable.
        write_record(self.backend.as_ref(), &profile.keyring, &keyring).await?;
        write_record(
            self.backend.as_ref(),
            &self.layout.profile_location(user),
            &profile,
        )
        .await?;

        info!(user = %secure(user.as_str()), "profile registered");
        UserAuth::new(profile, document_key)
    }

    /// Unwrap `user`'s document key with `password`.
    pub async fn unlock(&self, user: &UserId, password: &UserPassword) -> LockboxResult<UserAuth> {
        let profile = self
            .read_profile(user)
            .await?
            .ok_or(LockboxError::NotFound { what: "profile" })?;
        let keyring: KeyringDocument = read_record(self.backend.as_ref(), &profile.keyring)
            .await?
            .ok_or(LockboxError::NotFound { what: "keyring" })?;

        let document_key = {
            let (user, password) = (user.clone(), password.clone());
            run_kdf(move || keyring.unlock(&user, &password)).await
        };
        let document_key = match document_key {
            Ok(key) => key,
            Err(e) => {
                if matches!(e, LockboxError::BadCredentials) {
                    warn!(user = %secure(user.as_str()), "unlock rejected: bad credentials");
                }
                return Err(e);
            }
        };

        debug!(user = %secure(user.as_str()), "keyring unlocked");
        UserAuth::new(profile, document_key)
    }

    /// Re-wrap the document key under `new_password`. Documents are untouched.
    ///
    /// The KDF parameters are refreshed to the store's current settings.
    pub async fn update_password(
        &self,
        auth: &UserAuth,
        new_password: &UserPassword,
    ) -> LockboxResult<()> {
        let lock = self.locks.lock_for(auth.user());
        let _guard = lock.lock().await;

        let profile = self.verify(auth).await?;
        let keyring = {
            let (user, password, key, params) = (
                auth.user().clone(),
                new_password.clone(),
                auth.document_key().clone(),
                self.kdf.clone(),
            );
            run_kdf(move || KeyringDocument::seal(&user, &password, &key, &params)).await?
        };
        write_record(self.backend.as_ref(), &profile.keyring, &keyring).await?;

        info!(user = %secure(auth.user().as_str()), "password updated");
        Ok(())
    }

    /// Delete `user`'s profile, keyring and documents.
    ///
    /// Deleting the profile comes first: from then on every outstanding
    /// `UserAuth` for the user fails with `RevokedAuth`.
    pub async fn remove(&self, user: &UserId) -> LockboxResult<()> {
        let lock = self.locks.lock_for(user);
        let _guard = lock.lock().await;

        let profile = self
            .read_profile(user)
            .await?
            .ok_or(LockboxError::NotFound { what: "profile" })?;

        self.backend
            .delete(&self.layout.profile_location(user))
            .await?;
        self.backend.delete(&profile.keyring).await?;

        let user_root = self.layout.user_root(&profile.layout_root);
        let leftovers: Vec<_> = self.backend.list(&user_root).await?.try_collect().await?;
        for location in &leftovers {
            self.backend.delete(location).await?;
        }

        info!(
            user = %secure(user.as_str()),
            purged = leftovers.len(),
            "profile removed"
        );
        Ok(())
    }

    pub async fn exists(&self, user: &UserId) -> LockboxResult<bool> {
        Ok(self.read_profile(user).await?.is_some())
    }

    pub async fn load_profile(&self, user: &UserId) -> LockboxResult<Profile> {
        self.read_profile(user)
            .await?
            .ok_or(LockboxError::NotFound { what: "profile" })
    }

    /// Current profile for `auth`, or `RevokedAuth` if it was removed or
    /// replaced since `auth` was issued.
    pub async fn verify(&self, auth: &UserAuth) -> LockboxResult<Profile> {
        match self.read_profile(auth.user()).await? {
            Some(profile) if profile.profile_id == auth.profile_id() => Ok(profile),
            _ => Err(LockboxError::RevokedAuth),
        }
    }

    /// Like [`verify`](Self::verify), but keeps the user's lock held for as
    /// long as the returned guard lives. Work done under it cannot race a
    /// concurrent `remove` purging the user's tree.
    pub async fn lock_current(&self, auth: &UserAuth) -> LockboxResult<CurrentProfile> {
        let guard = self.locks.lock_for(auth.user()).lock_owned().await;
        let profile = self.verify(auth).await?;
        Ok(CurrentProfile {
            profile,
            _guard: guard,
        })
    }

    async fn read_profile(&self, user: &UserId) -> LockboxResult<Option<Profile>> {
        let profile: Option<Profile> =
            read_record(self.backend.as_ref(), &self.layout.profile_location(user)).await?;
        match profile {
            Some(p) if &p.user_id != user => Err(LockboxError::integrity(
                "profile record belongs to a different user",
            )),
            other => Ok(other),
        }
    }
}

/// Run Argon2id work on the blocking pool.
async fn run_kdf<T, F>(work: F) -> LockboxResult<T>
where
    F: FnOnce() -> LockboxResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LockboxError::Crypto(format!("key derivation task failed: {e}")))?
}
