pub mod message;
pub mod notification;

pub use message::*;
pub use notification::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name used when a user's profile cannot be loaded.
pub const FALLBACK_DISPLAY_NAME: &str = "Someone";

/// Profile fields the delivery path reads from the user collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_banned: bool,
}

/// Public view of a user embedded in outbound events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserSummary {
    pub fn fallback(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: FALLBACK_DISPLAY_NAME.to_string(),
            avatar_url: None,
        }
    }
}

impl From<UserProfile> for UserSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
        }
    }
}
