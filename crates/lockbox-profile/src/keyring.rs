//! Persisted keyring: the document key wrapped under a password-derived key
//!
//! The two levels are explicit fields. `kdf` says how to turn the password
//! into the key-encrypting key; `wrapped_document_key` is the document key
//! sealed under it (XChaCha20-Poly1305, AAD = user id). Nothing else about
//! the user's keys is stored.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lockbox_core::{LockboxError, LockboxResult, UserId, UserPassword};
use lockbox_crypto::{
    derive_kek, generate_salt, unwrap_key, wrap_key, DocumentKey, KdfParams, SALT_SIZE,
};
use serde::{Deserialize, Serialize};

use crate::error::crypto_error;

pub const KEYRING_VERSION: u32 = 1;
pub const KDF_ARGON2ID: &str = "argon2id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSection {
    pub algorithm: String,
    pub params: KdfParams,
    /// Base64 salt
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringDocument {
    pub version: u32,
    pub kdf: KdfSection,
    /// Base64 `[nonce][ciphertext + tag]`
    pub wrapped_document_key: String,
}

impl KeyringDocument {
    /// Wrap `document_key` under a key freshly derived from `password`.
    ///
    /// Runs Argon2id, so call it off the async executor.
    pub fn seal(
        user: &UserId,
        password: &UserPassword,
        document_key: &DocumentKey,
        params: &KdfParams,
    ) -> LockboxResult<Self> {
        let salt = generate_salt();
        let kek = derive_kek(password.as_secret(), &salt, params).map_err(crypto_error)?;
        let wrapped = wrap_key(&kek, document_key, user.as_ref()).map_err(crypto_error)?;

        Ok(Self {
            version: KEYRING_VERSION,
            kdf: KdfSection {
                algorithm: KDF_ARGON2ID.into(),
                params: params.clone(),
                salt: STANDARD.encode(salt),
            },
            wrapped_document_key: STANDARD.encode(wrapped),
        })
    }

    /// Recover the document key. A wrong password is `BadCredentials`.
    ///
    /// Runs Argon2id, so call it off the async executor.
    pub fn unlock(&self, user: &UserId, password: &UserPassword) -> LockboxResult<DocumentKey> {
        if self.version != KEYRING_VERSION || self.kdf.algorithm != KDF_ARGON2ID {
            return Err(LockboxError::integrity("unsupported keyring format"));
        }
        let salt: [u8; SALT_SIZE] = STANDARD
            .decode(&self.kdf.salt)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| LockboxError::integrity("keyring salt is malformed"))?;
        let wrapped = STANDARD
            .decode(&self.wrapped_document_key)
            .map_err(|_| LockboxError::integrity("wrapped document key is malformed"))?;

        let kek = derive_kek(password.as_secret(), &salt, &self.kdf.params).map_err(crypto_error)?;
        unwrap_key(&kek, &wrapped, user.as_ref()).map_err(crypto_error)
    }
}
