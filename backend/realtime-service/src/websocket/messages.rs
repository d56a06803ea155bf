/// WebSocket event types
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageView, NotificationView};

/// Events sent by clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Announce identity; must be the first event on a socket
    Setup { user_id: Uuid },

    JoinRoom { room_id: String },

    Typing { room_id: String },

    StopTyping { room_id: String },
}

/// Events pushed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Setup acknowledged
    Connected { session_id: Uuid, user_id: Uuid },

    UserStatus {
        user_id: Uuid,
        online: bool,
        display_name: String,
        avatar_url: Option<String>,
    },

    MessageReceived { message: MessageView },

    NewNotification { notification: NotificationView },

    PostApproved { post_id: String, owner_id: Uuid },

    PostRejected { post_id: String },

    PhotoApproved { photo_id: String, owner_id: Uuid },

    PhotoDenied { photo_id: String },

    AccountBanned {
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    Typing { room_id: String, user_id: Uuid },

    StopTyping { room_id: String, user_id: Uuid },

    Error { message: String },
}

impl ClientEvent {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Wire name, also used as a metrics label
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::UserStatus { .. } => "user_status",
            ServerEvent::MessageReceived { .. } => "message_received",
            ServerEvent::NewNotification { .. } => "new_notification",
            ServerEvent::PostApproved { .. } => "post_approved",
            ServerEvent::PostRejected { .. } => "post_rejected",
            ServerEvent::PhotoApproved { .. } => "photo_approved",
            ServerEvent::PhotoDenied { .. } => "photo_denied",
            ServerEvent::AccountBanned { .. } => "account_banned",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::StopTyping { .. } => "stop_typing",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
