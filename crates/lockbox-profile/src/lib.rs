//! lockbox-profile: per-user key material and the persisted layout
//!
//! A user's profile binds their id to a keyring and a layout root. The
//! keyring holds the document key wrapped under a password-derived key.
//! [`ProfileStore`] owns both records and hands out [`UserAuth`]
//! capabilities holding the unwrapped keys.

pub mod error;
pub mod keyring;
pub mod layout;
pub mod profile;
pub mod record;
pub mod store;

pub use error::crypto_error;
pub use keyring::KeyringDocument;
pub use layout::{DfsLayout, LAYOUT_VERSION};
pub use profile::Profile;
pub use store::{CurrentProfile, ProfileStore, UserAuth};
