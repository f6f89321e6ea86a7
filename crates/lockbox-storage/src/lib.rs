//! lockbox-storage: the storage backend seam
//!
//! Everything above this crate talks to storage only through
//! [`StorageBackend`]. [`OpendalBackend`] is the one implementation shipped,
//! covering the filesystem, in-memory and S3-compatible services.

pub mod backend;
pub mod health;
pub mod logging;
pub mod opendal_backend;
pub mod operator;

pub use backend::{BackendSink, BackendSource, LocationStream, StorageBackend};
pub use health::check_health;
pub use opendal_backend::OpendalBackend;
pub use operator::{build_operator, S3Credentials};
