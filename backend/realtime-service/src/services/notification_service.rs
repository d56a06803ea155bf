/// Notification Fan-out
///
/// Creates persisted notifications for domain events and forwards them to
/// the recipient's sessions, falling back to push when none is connected.
/// Idempotent types are created at most once per unread key.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EventRouter, PushDispatcher, PushRequest};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    NewNotification, Notification, NotificationInsert, NotificationType, NotificationView,
    UserSummary,
};
use crate::repository::Store;
use crate::websocket::ServerEvent;

/// Push title for notifications without a sender
pub const SYSTEM_PUSH_TITLE: &str = "Notification";

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub sender_id: Option<Uuid>,
    pub subject_ref: Option<String>,
    pub message: Option<String>,
}

pub struct NotificationService {
    store: Arc<dyn Store>,
    router: EventRouter,
    dispatcher: Arc<PushDispatcher>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, router: EventRouter, dispatcher: Arc<PushDispatcher>) -> Self {
        Self {
            store,
            router,
            dispatcher,
        }
    }

    /// Returns `None` for self-notifications. For a suppressed duplicate the
    /// existing notification is returned and nothing is routed.
    pub async fn notify(&self, req: NotifyRequest) -> Result<Option<Notification>> {
        let kind = req.notification_type;
        if req.sender_id == Some(req.recipient_id) {
            metrics::record_notification(kind.as_str(), "self");
            debug!(recipient_id = %req.recipient_id, kind = kind.as_str(), "Skipping self-notification");
            return Ok(None);
        }

        let new = NewNotification {
            recipient_id: req.recipient_id,
            sender_id: req.sender_id,
            notification_type: kind,
            subject_ref: req.subject_ref,
            message: req.message,
        };

        if kind.is_idempotent() {
            if let Some(existing) = self.store.find_notification_by_key(&new.key()).await? {
                metrics::record_notification(kind.as_str(), "suppressed");
                debug!(notification_id = %existing.id, "Duplicate notification suppressed");
                return Ok(Some(existing));
            }
        }

        let sender = match new.sender_id {
            Some(id) => Some(self.user_summary(id).await),
            None => None,
        };
        let new = NewNotification {
            message: new.message.or_else(|| {
                let name = sender
                    .as_ref()
                    .map(|s| s.display_name.as_str())
                    .unwrap_or(SYSTEM_PUSH_TITLE);
                Some(kind.default_text(name))
            }),
            ..new
        };

        let notification = match self.store.create_notification_if_absent(new).await? {
            NotificationInsert::Existing(existing) => {
                metrics::record_notification(kind.as_str(), "suppressed");
                debug!(notification_id = %existing.id, "Duplicate notification suppressed at insert");
                return Ok(Some(existing));
            }
            NotificationInsert::Created(created) => created,
        };
        metrics::record_notification(kind.as_str(), "created");

        self.route(&notification, sender);
        Ok(Some(notification))
    }

    fn route(&self, notification: &Notification, sender: Option<UserSummary>) {
        let title = sender
            .as_ref()
            .map(|s| s.display_name.clone())
            .unwrap_or_else(|| SYSTEM_PUSH_TITLE.to_string());
        let view = NotificationView::new(notification, sender);

        let delivered = self.router.send_to_user(
            notification.recipient_id,
            ServerEvent::NewNotification { notification: view },
        );
        if delivered {
            info!(notification_id = %notification.id, "Notification delivered live");
            return;
        }

        let body = notification
            .message
            .clone()
            .unwrap_or_else(|| notification.notification_type.default_text(&title));
        self.dispatcher.enqueue(PushRequest {
            recipient_id: notification.recipient_id,
            title,
            body,
            data: json!({
                "type": notification.notification_type.as_str(),
                "notification_id": notification.id,
                "subject_ref": notification.subject_ref,
            }),
            message_id: None,
        });
        info!(notification_id = %notification.id, "Recipient offline, notification queued for push");
    }

    /// Newest first, banned senders excluded
    pub async fn list_notifications(
        &self,
        recipient_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<NotificationView>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let notifications = self.store.list_notifications(recipient_id, limit).await?;

        let mut views = Vec::with_capacity(notifications.len());
        for n in &notifications {
            let sender = match n.sender_id {
                Some(id) => Some(self.user_summary(id).await),
                None => None,
            };
            views.push(NotificationView::new(n, sender));
        }
        Ok(views)
    }

    /// Idempotent; only the recipient may mark a notification read.
    pub async fn mark_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<()> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if notification.recipient_id != recipient_id {
            return Err(AppError::Forbidden);
        }
        if !notification.read {
            self.store.mark_notification_read(notification_id).await?;
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let changed = self.store.mark_all_notifications_read(recipient_id).await?;
        debug!(%recipient_id, changed, "Marked all notifications read");
        Ok(changed)
    }

    async fn user_summary(&self, user_id: Uuid) -> UserSummary {
        match self.store.get_user_profile(user_id).await {
            Ok(Some(profile)) => profile.into(),
            Ok(None) => UserSummary::fallback(user_id),
            Err(e) => {
                warn!(%user_id, error = %e, "Profile lookup failed");
                UserSummary::fallback(user_id)
            }
        }
    }
}
