use lockbox_core::{AbsoluteLocation, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layout::{DfsLayout, LAYOUT_VERSION};

/// Version of the profile record format.
pub const PROFILE_VERSION: u32 = 1;

/// Persisted record binding a user id to a keyring and a layout root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub version: u32,
    pub user_id: UserId,
    /// Fresh on every registration; a `UserAuth` is valid only while the
    /// stored profile still carries the id it was issued against.
    pub profile_id: Uuid,
    pub layout_root: Uuid,
    pub keyring: AbsoluteLocation,
    pub layout_version: u32,
}

impl Profile {
    /// A new profile with random ids, placed according to `layout`.
    pub fn generate(user: &UserId, layout: &DfsLayout) -> Self {
        let layout_root = Uuid::new_v4();
        Self {
            version: PROFILE_VERSION,
            user_id: user.clone(),
            profile_id: Uuid::new_v4(),
            layout_root,
            keyring: layout.keyring_location(&layout_root),
            layout_version: LAYOUT_VERSION,
        }
    }
}
