//! Placement of lockbox state inside the backend
//!
//! ```text
//! <system_root>/
//!   profiles/<user storage key>/profile.json
//!   users/<layout root uuid>/
//!     keystore/keyring.json
//!     private/files/<encrypted segment>/...
//! ```
//!
//! Profiles are found by user id. Everything else a user owns hangs off a
//! random layout root, so a re-registered id never sees a previous owner's
//! data, and user trees reveal nothing about who owns them.

use lockbox_core::config::LayoutConfig;
use lockbox_core::{AbsoluteLocation, UserId};
use uuid::Uuid;

/// Version of the layout above, recorded in every profile.
pub const LAYOUT_VERSION: u32 = 1;

const PROFILES_DIR: &str = "profiles";
const PROFILE_FILE: &str = "profile.json";
const USERS_DIR: &str = "users";
const KEYSTORE_DIR: &str = "keystore";
const KEYRING_FILE: &str = "keyring.json";
const PRIVATE_DIR: &str = "private";
const FILES_DIR: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfsLayout {
    system_root: AbsoluteLocation,
}

impl DfsLayout {
    pub fn new(system_root: impl Into<String>) -> Self {
        let root: String = system_root.into();
        Self {
            system_root: AbsoluteLocation::new(root.trim_end_matches('/')),
        }
    }

    pub fn from_config(config: &LayoutConfig) -> Self {
        Self::new(config.system_root.clone())
    }

    pub fn system_root(&self) -> &AbsoluteLocation {
        &self.system_root
    }

    pub fn profiles_dir(&self) -> AbsoluteLocation {
        self.system_root.join(PROFILES_DIR)
    }

    pub fn profile_location(&self, user: &UserId) -> AbsoluteLocation {
        self.profiles_dir()
            .join(&user.storage_key())
            .join(PROFILE_FILE)
    }

    /// Everything owned by one layout root: keystore and documents.
    pub fn user_root(&self, layout_root: &Uuid) -> AbsoluteLocation {
        self.system_root
            .join(USERS_DIR)
            .join(&layout_root.to_string())
    }

    pub fn keyring_location(&self, layout_root: &Uuid) -> AbsoluteLocation {
        self.user_root(layout_root)
            .join(KEYSTORE_DIR)
            .join(KEYRING_FILE)
    }

    /// Directory under which a user's encrypted documents live.
    pub fn private_root(&self, layout_root: &Uuid) -> AbsoluteLocation {
        self.user_root(layout_root)
            .join(PRIVATE_DIR)
            .join(FILES_DIR)
    }
}

impl Default for DfsLayout {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}
