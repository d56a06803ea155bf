use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserSummary;

/// Notification type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// User liked a post
    LikePost,
    /// User commented on a post
    CommentPost,
    PostApproved,
    PostRejected,
    PhotoApproved,
    PhotoDenied,
    VerificationApproved,
    VerificationDenied,
    AccountBanned,
    /// A report was filed about content or a user
    Report,
    /// Free-form message from an administrator
    AdminNotification,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::LikePost => "like_post",
            NotificationType::CommentPost => "comment_post",
            NotificationType::PostApproved => "post_approved",
            NotificationType::PostRejected => "post_rejected",
            NotificationType::PhotoApproved => "photo_approved",
            NotificationType::PhotoDenied => "photo_denied",
            NotificationType::VerificationApproved => "verification_approved",
            NotificationType::VerificationDenied => "verification_denied",
            NotificationType::AccountBanned => "account_banned",
            NotificationType::Report => "report",
            NotificationType::AdminNotification => "admin_notification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like_post" => Some(NotificationType::LikePost),
            "comment_post" => Some(NotificationType::CommentPost),
            "post_approved" => Some(NotificationType::PostApproved),
            "post_rejected" => Some(NotificationType::PostRejected),
            "photo_approved" => Some(NotificationType::PhotoApproved),
            "photo_denied" => Some(NotificationType::PhotoDenied),
            "verification_approved" => Some(NotificationType::VerificationApproved),
            "verification_denied" => Some(NotificationType::VerificationDenied),
            "account_banned" => Some(NotificationType::AccountBanned),
            "report" => Some(NotificationType::Report),
            "admin_notification" => Some(NotificationType::AdminNotification),
            _ => None,
        }
    }

    /// At most one unread notification per key for these types.
    /// Comments and admin messages may legitimately repeat.
    pub fn is_idempotent(&self) -> bool {
        !matches!(
            self,
            NotificationType::CommentPost | NotificationType::AdminNotification
        )
    }

    /// Text used when the caller supplies none
    pub fn default_text(&self, sender_name: &str) -> String {
        match self {
            NotificationType::LikePost => format!("{sender_name} liked your post"),
            NotificationType::CommentPost => format!("{sender_name} commented on your post"),
            NotificationType::PostApproved => {
                "Your post has been approved and is now visible.".to_string()
            }
            NotificationType::PostRejected => "Your post was not approved.".to_string(),
            NotificationType::PhotoApproved => "Your photo has been approved.".to_string(),
            NotificationType::PhotoDenied => "Your photo was not approved.".to_string(),
            NotificationType::VerificationApproved => {
                "Your account has been verified.".to_string()
            }
            NotificationType::VerificationDenied => {
                "Your verification request was denied.".to_string()
            }
            NotificationType::AccountBanned => "Your account has been banned.".to_string(),
            NotificationType::Report => "A new report requires your attention.".to_string(),
            NotificationType::AdminNotification => "You have a new message from the team.".to_string(),
        }
    }
}

/// Uniqueness key for idempotent notification types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub subject_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub subject_ref: Option<String>,
    pub message: Option<String>,
}

impl NewNotification {
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            notification_type: self.notification_type,
            subject_ref: self.subject_ref.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub subject_ref: Option<String>,
    pub message: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            notification_type: self.notification_type,
            subject_ref: self.subject_ref.clone(),
        }
    }
}

/// Result of an atomic check-then-insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationInsert {
    Created(Notification),
    /// An unread notification with the same key already existed
    Existing(Notification),
}

impl NotificationInsert {
    pub fn into_inner(self) -> Notification {
        match self {
            NotificationInsert::Created(n) | NotificationInsert::Existing(n) => n,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, NotificationInsert::Created(_))
    }
}

/// Notification as delivered to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub sender: Option<UserSummary>,
    pub subject_ref: Option<String>,
    pub message: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationView {
    pub fn new(notification: &Notification, sender: Option<UserSummary>) -> Self {
        Self {
            id: notification.id,
            notification_type: notification.notification_type,
            sender,
            subject_ref: notification.subject_ref.clone(),
            message: notification.message.clone(),
            read: notification.read,
            created_at: notification.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent_types() {
        assert!(NotificationType::LikePost.is_idempotent());
        assert!(NotificationType::PostApproved.is_idempotent());
        assert!(NotificationType::PhotoDenied.is_idempotent());
        assert!(NotificationType::VerificationApproved.is_idempotent());
        assert!(NotificationType::AccountBanned.is_idempotent());
        assert!(NotificationType::Report.is_idempotent());
        assert!(!NotificationType::CommentPost.is_idempotent());
        assert!(!NotificationType::AdminNotification.is_idempotent());
    }

    #[test]
    fn test_type_wire_names_match_as_str() {
        let t = NotificationType::VerificationDenied;
        let json = serde_json::to_value(t).unwrap();
        assert_eq!(json, serde_json::json!(t.as_str()));
        assert_eq!(NotificationType::parse("like_post"), Some(NotificationType::LikePost));
        assert_eq!(NotificationType::parse("LIKE"), None);
    }

    #[test]
    fn test_default_text_uses_sender_name() {
        assert_eq!(
            NotificationType::LikePost.default_text("Alice"),
            "Alice liked your post"
        );
        assert_eq!(
            NotificationType::PostApproved.default_text("Admin"),
            "Your post has been approved and is now visible."
        );
    }
}
