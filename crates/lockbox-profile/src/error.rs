use lockbox_core::LockboxError;
use lockbox_crypto::CryptoError;

/// Map a crypto failure onto the caller-facing taxonomy.
///
/// A wrapped key that fails to authenticate means the password was wrong.
pub fn crypto_error(err: CryptoError) -> LockboxError {
    match err {
        CryptoError::Integrity(reason) => LockboxError::IntegrityFailure { reason },
        CryptoError::Unwrap => LockboxError::BadCredentials,
        other => LockboxError::Crypto(other.to_string()),
    }
}
