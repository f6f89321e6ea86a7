use thiserror::Error;

pub type LockboxResult<T> = Result<T, LockboxError>;

/// Errors surfaced to callers of the profile store and the private store.
///
/// `BadCredentials` and `IntegrityFailure` are definitive: nothing in lockbox
/// retries them. Only a [`BackendError`] flagged `retryable` by the backend
/// is worth retrying, and that decision belongs to the caller.
#[derive(Debug, Error)]
pub enum LockboxError {
    #[error("profile already exists")]
    AlreadyExists,

    #[error("{what} not found")]
    NotFound { what: &'static str },

    #[error("bad credentials")]
    BadCredentials,

    #[error("integrity check failed: {reason}")]
    IntegrityFailure { reason: String },

    #[error("authorization revoked: profile was removed")]
    RevokedAuth,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    #[error("invalid user id: {reason}")]
    InvalidUserId { reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LockboxError {
    pub fn integrity(reason: impl Into<String>) -> Self {
        LockboxError::IntegrityFailure {
            reason: reason.into(),
        }
    }

    pub fn invalid_path(reason: impl Into<String>) -> Self {
        LockboxError::InvalidPath {
            reason: reason.into(),
        }
    }

    /// True only when the backend itself reported a transient failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockboxError::Backend(e) if e.retryable)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LockboxError::NotFound { .. })
            || matches!(self, LockboxError::Backend(e) if e.is_not_found())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    Other,
}

/// Opaque failure reported by a storage backend.
///
/// Lockbox never reinterprets the message; it only looks at `kind` to map a
/// missing object onto [`LockboxError::NotFound`].
#[derive(Debug, Clone, Error)]
#[error("backend failure: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub retryable: bool,
    pub message: String,
}

impl BackendError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::NotFound,
            retryable: false,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Other,
            retryable: false,
            message: message.into(),
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == BackendErrorKind::NotFound
    }
}
