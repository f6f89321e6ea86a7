//! lockbox-crypto: client-side encryption for lockbox
//!
//! Key hierarchy:
//! ```text
//! Password
//!   └── Key-Encrypting Key (256-bit, Argon2id(password, salt, params))
//!         └── wraps Document Key (256-bit random, one per user, XChaCha20-Poly1305, AAD = user id)
//!               ├── Envelope AEAD: XChaCha20-Poly1305, segmented (see `envelope`)
//!               └── Path Key (HKDF-SHA256 from document key, domain="lockbox-paths", AES-SIV)
//! ```
//!
//! Changing the password only re-wraps the document key, so existing
//! envelopes and encrypted path names stay valid.

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod names;

pub use envelope::{open, seal, EnvelopeOpener, EnvelopeSealer, SegmentSize};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_kek, generate_salt, KdfParams, KeyEncryptionKey, SALT_SIZE};
pub use keys::{derive_path_key, generate_document_key, unwrap_key, wrap_key, DocumentKey, PathKey};
pub use names::{decrypt_segment, encrypt_segment};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
