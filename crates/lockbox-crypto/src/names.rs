//! AES-SIV path-segment encryption
//!
//! Deterministic encryption (same plaintext + key = same ciphertext) is required
//! for path names: resolving a logical path must always land on the same
//! backend location, and two different names must never collide. AES-SIV gives
//! both, with authentication, so a renamed or forged backend entry is detected
//! when listing.

use aes_siv::{
    aead::{Aead, KeyInit},
    Aes256SivAead, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::PathKey;

/// Encrypt one path segment. Output is base64url without padding, so it is
/// safe as an object-store key or filename component.
pub fn encrypt_segment(path_key: &PathKey, segment: &str) -> CryptoResult<String> {
    let cipher = Aes256SivAead::new(path_key.as_bytes().into());
    // AES-SIV uses a zero nonce for deterministic encryption
    let nonce = Nonce::default();

    let ciphertext = cipher
        .encrypt(&nonce, segment.as_bytes())
        .map_err(|e| CryptoError::Encrypt(format!("path segment: {e}")))?;

    Ok(URL_SAFE_NO_PAD.encode(ciphertext))
}

/// Decrypt one path segment produced by [`encrypt_segment`].
pub fn decrypt_segment(path_key: &PathKey, encoded: &str) -> CryptoResult<String> {
    let ciphertext = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::Integrity(format!("path segment is not base64url: {e}")))?;

    let cipher = Aes256SivAead::new(path_key.as_bytes().into());
    let nonce = Nonce::default();

    let plaintext = cipher
        .decrypt(&nonce, ciphertext.as_ref())
        .map_err(|_| CryptoError::Integrity("path segment failed authentication".into()))?;

    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Integrity(format!("decrypted segment is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derive_path_key, DocumentKey};
    use crate::KEY_SIZE;

    fn path_key(seed: u8) -> PathKey {
        derive_path_key(&DocumentKey::from_bytes([seed; KEY_SIZE])).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_segment_roundtrip() {
        let key = path_key(0x55);
        let encrypted = encrypt_segment(&key, "secret.txt").unwrap();
        assert_eq!(decrypt_segment(&key, &encrypted).unwrap(), "secret.txt");
    }

    #[test]
    fn test_deterministic_encryption() {
        let key = path_key(0x55);
        let enc1 = encrypt_segment(&key, "folder1").unwrap();
        let enc2 = encrypt_segment(&key, "folder1").unwrap();
        assert_eq!(enc1, enc2, "AES-SIV must be deterministic");
    }

    #[test]
    fn test_different_names_different_ciphertext() {
        let key = path_key(0x55);
        let enc1 = encrypt_segment(&key, "file_a.txt").unwrap();
        let enc2 = encrypt_segment(&key, "file_b.txt").unwrap();
        assert_ne!(enc1, enc2);
    }

    #[test]
    fn test_output_is_path_safe() {
        let key = path_key(0x55);
        let long = "x".repeat(100);
        for name in ["a", "folder1", "ünïcödé", "with space", long.as_str()] {
            let enc = encrypt_segment(&key, name).unwrap();
            assert!(!enc.contains('/'));
            assert!(!enc.contains('='));
        }
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let encrypted = encrypt_segment(&path_key(0x11), "secret.txt").unwrap();
        let result = decrypt_segment(&path_key(0x22), &encrypted);
        assert!(matches!(result, Err(CryptoError::Integrity(_))));
    }

    #[test]
    fn test_decrypt_garbage() {
        let key = path_key(0x11);
        assert!(decrypt_segment(&key, "not*base64").is_err());
        assert!(decrypt_segment(&key, "AAAA").is_err());
    }
}
