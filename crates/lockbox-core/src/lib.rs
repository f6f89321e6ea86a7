//! lockbox-core: shared types for the lockbox private object store
//!
//! - [`identity`]: user ids and passwords
//! - [`resource`]: logical (user-relative) paths vs. absolute backend locations
//! - [`error`]: the caller-facing error taxonomy
//! - [`config`]: TOML configuration schema
//! - [`redact`]: fingerprinting of sensitive values before they reach a log sink

pub mod config;
pub mod error;
pub mod identity;
pub mod redact;
pub mod resource;

pub use error::{BackendError, BackendErrorKind, LockboxError, LockboxResult};
pub use identity::{UserId, UserPassword};
pub use resource::{AbsoluteLocation, PrivatePath, ResolvedResource};
