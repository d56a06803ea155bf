/// Moderation entry points
///
/// Called by the moderation workflow once a decision is made. Each helper
/// persists the owner's notification first, then emits the live domain event.
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::{EventRouter, NotificationService, NotifyRequest};
use crate::error::Result;
use crate::models::{Notification, NotificationType};
use crate::websocket::ServerEvent;

pub struct ModerationService {
    notifications: Arc<NotificationService>,
    router: EventRouter,
}

impl ModerationService {
    pub fn new(notifications: Arc<NotificationService>, router: EventRouter) -> Self {
        Self {
            notifications,
            router,
        }
    }

    async fn notify(
        &self,
        recipient_id: Uuid,
        notification_type: NotificationType,
        actor_id: Uuid,
        subject_ref: Option<String>,
        message: Option<String>,
    ) -> Result<Option<Notification>> {
        self.notifications
            .notify(NotifyRequest {
                recipient_id,
                notification_type,
                sender_id: Some(actor_id),
                subject_ref,
                message,
            })
            .await
    }

    /// Approved posts become visible to everyone, so every session hears about it.
    pub async fn approve_post(
        &self,
        admin_id: Uuid,
        post_id: &str,
        owner_id: Uuid,
    ) -> Result<Option<Notification>> {
        let notification = self
            .notify(owner_id, NotificationType::PostApproved, admin_id, Some(post_id.to_string()), None)
            .await?;
        let reached = self.router.broadcast_all(ServerEvent::PostApproved {
            post_id: post_id.to_string(),
            owner_id,
        });
        info!(post_id, %owner_id, sessions = reached, "Post approved");
        Ok(notification)
    }

    pub async fn reject_post(
        &self,
        admin_id: Uuid,
        post_id: &str,
        owner_id: Uuid,
        reason: Option<String>,
    ) -> Result<Option<Notification>> {
        let notification = self
            .notify(owner_id, NotificationType::PostRejected, admin_id, Some(post_id.to_string()), reason)
            .await?;
        self.router.send_to_user(
            owner_id,
            ServerEvent::PostRejected {
                post_id: post_id.to_string(),
            },
        );
        info!(post_id, %owner_id, "Post rejected");
        Ok(notification)
    }

    pub async fn approve_photo(
        &self,
        admin_id: Uuid,
        photo_id: &str,
        owner_id: Uuid,
    ) -> Result<Option<Notification>> {
        let notification = self
            .notify(owner_id, NotificationType::PhotoApproved, admin_id, Some(photo_id.to_string()), None)
            .await?;
        let reached = self.router.broadcast_all(ServerEvent::PhotoApproved {
            photo_id: photo_id.to_string(),
            owner_id,
        });
        info!(photo_id, %owner_id, sessions = reached, "Photo approved");
        Ok(notification)
    }

    pub async fn deny_photo(
        &self,
        admin_id: Uuid,
        photo_id: &str,
        owner_id: Uuid,
        reason: Option<String>,
    ) -> Result<Option<Notification>> {
        let notification = self
            .notify(owner_id, NotificationType::PhotoDenied, admin_id, Some(photo_id.to_string()), reason)
            .await?;
        self.router.send_to_user(
            owner_id,
            ServerEvent::PhotoDenied {
                photo_id: photo_id.to_string(),
            },
        );
        info!(photo_id, %owner_id, "Photo denied");
        Ok(notification)
    }

    pub async fn ban_account(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
    ) -> Result<Option<Notification>> {
        let notification = self
            .notify(user_id, NotificationType::AccountBanned, admin_id, None, reason.clone())
            .await?;
        self.router
            .send_to_user(user_id, ServerEvent::AccountBanned { user_id, reason });
        info!(%user_id, "Account banned");
        Ok(notification)
    }

    pub async fn decide_verification(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        approved: bool,
        message: Option<String>,
    ) -> Result<Option<Notification>> {
        let kind = if approved {
            NotificationType::VerificationApproved
        } else {
            NotificationType::VerificationDenied
        };
        self.notify(user_id, kind, admin_id, None, message).await
    }

    /// One notification per reporter and subject while it stays unread
    pub async fn report_filed(
        &self,
        reporter_id: Uuid,
        recipient_id: Uuid,
        subject_ref: &str,
        reason: Option<String>,
    ) -> Result<Option<Notification>> {
        self.notify(
            recipient_id,
            NotificationType::Report,
            reporter_id,
            Some(subject_ref.to_string()),
            reason,
        )
        .await
    }
}
