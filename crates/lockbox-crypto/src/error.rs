use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication tag or envelope structure did not verify.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// Wrapped key did not authenticate under the supplied key-encrypting key.
    #[error("key unwrapping failed: wrong key or corrupted data")]
    Unwrap,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("segment counter exhausted for this envelope")]
    NonceExhausted,

    #[error("encryption failed: {0}")]
    Encrypt(String),
}
