//! Key hierarchy: document key generation, path key derivation, key wrapping

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::KeyEncryptionKey;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Size of the AES-256-SIV key (two 256-bit sub-keys).
pub const PATH_KEY_SIZE: usize = 64;

/// A user's 256-bit document encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct DocumentKey {
    bytes: [u8; KEY_SIZE],
}

impl DocumentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DocumentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-SIV key for deterministic path-segment encryption. Zeroized on drop.
#[derive(Clone)]
pub struct PathKey {
    bytes: [u8; PATH_KEY_SIZE],
}

impl PathKey {
    pub fn as_bytes(&self) -> &[u8; PATH_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for PathKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit document key.
pub fn generate_document_key() -> DocumentKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    DocumentKey::from_bytes(bytes)
}

/// Derive the path-name key from the document key via HKDF-SHA256.
pub fn derive_path_key(document_key: &DocumentKey) -> CryptoResult<PathKey> {
    let hkdf = Hkdf::<Sha256>::new(None, document_key.as_bytes());
    let mut okm = [0u8; PATH_KEY_SIZE];
    hkdf.expand(b"lockbox-paths", &mut okm)
        .map_err(|e| CryptoError::Kdf(format!("HKDF expand failed: {e}")))?;
    Ok(PathKey { bytes: okm })
}

/// Wrap (encrypt) a document key under the key-encrypting key.
///
/// `aad` binds the wrapped key to its owner (the user id), so a keyring
/// copied into another profile does not unwrap.
///
/// Output: `[24-byte nonce][ciphertext + 16-byte tag]`
pub fn wrap_key(
    kek: &KeyEncryptionKey,
    document_key: &DocumentKey,
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(kek.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: document_key.as_bytes().as_ref(),
                aad,
            },
        )
        .map_err(|e| CryptoError::Encrypt(format!("key wrapping: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Unwrap (decrypt) a document key. A wrong password surfaces here as
/// [`CryptoError::Unwrap`], detected by the Poly1305 tag.
///
/// Input: `[24-byte nonce][ciphertext + 16-byte tag]` (output of `wrap_key`)
pub fn unwrap_key(kek: &KeyEncryptionKey, wrapped: &[u8], aad: &[u8]) -> CryptoResult<DocumentKey> {
    if wrapped.len() != NONCE_SIZE + KEY_SIZE + TAG_SIZE {
        return Err(CryptoError::Unwrap);
    }

    let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(kek.as_bytes().into());

    let mut plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Unwrap)?;

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(DocumentKey::from_bytes(key_bytes))
}
