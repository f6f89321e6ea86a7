//! Logical path ⇄ backend location
//!
//! `folder1/secret.txt` for a user with layout root `U` resolves to
//! `<system_root>/users/U/private/files/<E(folder1)>/<E(secret.txt)>`, where
//! `E` is deterministic AES-SIV under the user's path key. Layout roots are
//! unique per user, and `E` is injective, so resolution is injective within
//! a user and never aliases across users.

use lockbox_core::{AbsoluteLocation, LockboxResult, PrivatePath, ResolvedResource};
use lockbox_crypto::{decrypt_segment, encrypt_segment};
use lockbox_profile::{crypto_error, DfsLayout, UserAuth};

#[derive(Debug, Clone)]
pub struct PathResolver {
    layout: DfsLayout,
}

impl PathResolver {
    pub fn new(layout: DfsLayout) -> Self {
        Self { layout }
    }

    /// Directory holding every document of `auth`'s user.
    pub fn private_root(&self, auth: &UserAuth) -> AbsoluteLocation {
        self.layout.private_root(&auth.profile().layout_root)
    }

    /// Resolve `path` for `auth`. The root path resolves to the private root.
    pub fn resolve(&self, auth: &UserAuth, path: &PrivatePath) -> LockboxResult<ResolvedResource> {
        let mut location = self.private_root(auth);
        for segment in path.segments() {
            let encrypted = encrypt_segment(auth.path_key(), segment).map_err(crypto_error)?;
            location = location.join(&encrypted);
        }
        Ok(ResolvedResource {
            logical: path.clone(),
            location,
        })
    }

    /// Inverse of [`resolve`](Self::resolve): `Ok(None)` if `location` is not
    /// inside `auth`'s private root, an error if a name does not decrypt.
    pub fn logical_path(
        &self,
        auth: &UserAuth,
        location: &AbsoluteLocation,
    ) -> LockboxResult<Option<PrivatePath>> {
        let root = self.private_root(auth);
        let Some(encrypted) = location.relative_segments(&root) else {
            return Ok(None);
        };
        let segments = encrypted
            .into_iter()
            .map(|segment| decrypt_segment(auth.path_key(), segment).map_err(crypto_error))
            .collect::<LockboxResult<Vec<_>>>()?;
        PrivatePath::from_segments(segments).map(Some)
    }

    /// True if `resource` is exactly what `auth` would resolve its logical
    /// path to. Anything else was not produced for this user.
    pub fn owns(&self, auth: &UserAuth, resource: &ResolvedResource) -> LockboxResult<bool> {
        Ok(self.resolve(auth, &resource.logical)?.location == resource.location)
    }
}
