use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserSummary;
use crate::error::{AppError, Result};

/// Body shown in a push when the message has no text.
pub const MEDIA_ONLY_PREVIEW: &str = "Sent an image";

const PREVIEW_MAX_CHARS: usize = 100;

/// Delivery state of a direct message
///
/// Moves forward only:
/// `pending -> delivered_live | queued_push`, `queued_push -> push_sent | push_failed`.
/// `pending` may also go straight to a push outcome when the intermediate
/// `queued_push` write was lost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    DeliveredLive,
    QueuedPush,
    PushSent,
    PushFailed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::DeliveredLive => "delivered_live",
            DeliveryStatus::QueuedPush => "queued_push",
            DeliveryStatus::PushSent => "push_sent",
            DeliveryStatus::PushFailed => "push_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "delivered_live" => Some(DeliveryStatus::DeliveredLive),
            "queued_push" => Some(DeliveryStatus::QueuedPush),
            "push_sent" => Some(DeliveryStatus::PushSent),
            "push_failed" => Some(DeliveryStatus::PushFailed),
            _ => None,
        }
    }

    /// States from which `self` may be entered
    pub fn allowed_predecessors(&self) -> &'static [DeliveryStatus] {
        match self {
            DeliveryStatus::Pending => &[],
            DeliveryStatus::DeliveredLive | DeliveryStatus::QueuedPush => &[DeliveryStatus::Pending],
            DeliveryStatus::PushSent | DeliveryStatus::PushFailed => {
                &[DeliveryStatus::QueuedPush, DeliveryStatus::Pending]
            }
        }
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }
}

/// Text and/or media reference carried by a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub text: Option<String>,
    pub media_ref: Option<String>,
}

impl MessagePayload {
    pub fn new(text: Option<String>, media_ref: Option<String>) -> Self {
        Self { text, media_ref }.normalized()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Some(text.into()), None)
    }

    /// Blank strings count as absent.
    fn normalized(self) -> Self {
        Self {
            text: self.text.filter(|t| !t.trim().is_empty()),
            media_ref: self.media_ref.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let normalized = self.clone().normalized();
        if normalized.text.is_none() && normalized.media_ref.is_none() {
            return Err(AppError::Validation(
                "message requires text or a media reference".to_string(),
            ));
        }
        Ok(())
    }

    /// Push body: truncated text, or a fixed label for media-only messages
    pub fn preview(&self) -> String {
        match self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => truncate_preview(text, PREVIEW_MAX_CHARS),
            None => MEDIA_ONLY_PREVIEW.to_string(),
        }
    }
}

fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub payload: MessagePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub text: Option<String>,
    pub media_ref: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn payload(&self) -> MessagePayload {
        MessagePayload {
            text: self.text.clone(),
            media_ref: self.media_ref.clone(),
        }
    }
}

/// Message as delivered to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub sender: UserSummary,
    pub recipient_id: Uuid,
    pub text: Option<String>,
    pub media_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: &Message, sender: UserSummary) -> Self {
        Self {
            id: message.id,
            sender,
            recipient_id: message.recipient_id,
            text: message.text.clone(),
            media_ref: message.media_ref.clone(),
            created_at: message.created_at,
        }
    }
}
