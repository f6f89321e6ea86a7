//! User identities and passwords

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{LockboxError, LockboxResult};

/// Longest accepted user id, in bytes. Its base64 storage key must still
/// fit in a single filename component.
pub const MAX_USER_ID_LEN: usize = 128;

/// Opaque, immutable user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a user id.
    ///
    /// Any printable UTF-8 is accepted; the id never becomes a path segment
    /// directly (see [`UserId::storage_key`]).
    pub fn new(id: impl Into<String>) -> LockboxResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(LockboxError::InvalidUserId {
                reason: "empty".into(),
            });
        }
        if id.len() > MAX_USER_ID_LEN {
            return Err(LockboxError::InvalidUserId {
                reason: format!("longer than {MAX_USER_ID_LEN} bytes"),
            });
        }
        if id.chars().any(char::is_control) {
            return Err(LockboxError::InvalidUserId {
                reason: "contains control characters".into(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path-safe encoding of the id, used to name the profile directory.
    pub fn storage_key(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<[u8]> for UserId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Caller-supplied secret used only to derive the key-encrypting key.
///
/// Backed by [`SecretString`], so the bytes are zeroized when the value is
/// dropped. Call [`UserPassword::clear`] to drop it early.
#[derive(Clone)]
pub struct UserPassword(SecretString);

impl UserPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::from(password.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn as_secret(&self) -> &SecretString {
        &self.0
    }

    /// Consume and zeroize the password.
    pub fn clear(self) {
        drop(self);
    }
}

impl From<SecretString> for UserPassword {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl std::fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserPassword([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_control_characters() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("jane\n").is_err());
        assert!(UserId::new("x".repeat(MAX_USER_ID_LEN + 1)).is_err());
        assert!(UserId::new("jane").is_ok());
    }

    #[test]
    fn storage_key_has_no_separators() {
        let id = UserId::new("../../etc/passwd").unwrap();
        let key = id.storage_key();
        assert!(!key.contains('/'));
        assert!(!key.contains('.'));
    }

    #[test]
    fn storage_key_is_injective_for_lookalikes() {
        let a = UserId::new("jane").unwrap();
        let b = UserId::new("Jane").unwrap();
        assert_ne!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn password_debug_is_redacted() {
        let pw = UserPassword::new("secure-password jane");
        let rendered = format!("{pw:?}");
        assert!(!rendered.contains("secure-password"));
    }
}
