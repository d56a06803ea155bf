use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::Store;
use crate::error::{AppError, Result};
use crate::models::{
    DeliveryStatus, Message, NewMessage, NewNotification, Notification, NotificationInsert,
    NotificationKey, UserProfile,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, UserProfile>,
    /// Insertion order is creation order.
    messages: Vec<Message>,
    /// Insertion order is creation order.
    notifications: Vec<Notification>,
    push_tokens: HashMap<Uuid, String>,
    presence_log: Vec<(Uuid, bool, DateTime<Utc>)>,
}

/// Mutex-guarded in-process store
///
/// Every operation runs in one critical section, which is what makes
/// `create_notification_if_absent` atomic here.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user_id: Uuid, display_name: &str, avatar_url: Option<&str>) {
        self.state.lock().users.insert(
            user_id,
            UserProfile {
                user_id,
                display_name: display_name.to_string(),
                avatar_url: avatar_url.map(str::to_string),
                is_banned: false,
            },
        );
    }

    pub fn set_banned(&self, user_id: Uuid, banned: bool) {
        if let Some(user) = self.state.lock().users.get_mut(&user_id) {
            user.is_banned = banned;
        }
    }

    /// Make message and notification writes fail, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn notifications_for(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.state
            .lock()
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub fn presence_log(&self) -> Vec<(Uuid, bool, DateTime<Utc>)> {
        self.state.lock().presence_log.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("memory store writes disabled".to_string()));
        }
        Ok(())
    }
}

fn unread_match<'a>(
    notifications: &'a [Notification],
    key: &NotificationKey,
) -> Option<&'a Notification> {
    notifications
        .iter()
        .find(|n| !n.read && n.notification_type.is_idempotent() && n.key() == *key)
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        self.check_writable()?;
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            text: new.payload.text,
            media_ref: new.payload.media_ref,
            delivery_status: DeliveryStatus::Pending,
            created_at: Utc::now(),
        };
        self.state.lock().messages.push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.state.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid, limit: i64) -> Result<Vec<Message>> {
        let state = self.state.lock();
        let mut recent: Vec<Message> = state
            .messages
            .iter()
            .rev()
            .filter(|m| {
                (m.sender_id == user_a && m.recipient_id == user_b)
                    || (m.sender_id == user_b && m.recipient_id == user_a)
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn update_message_status(&self, id: Uuid, status: DeliveryStatus) -> Result<bool> {
        let mut state = self.state.lock();
        match state.messages.iter_mut().find(|m| m.id == id) {
            Some(message) if message.delivery_status.can_transition_to(status) => {
                message.delivery_status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_notification_if_absent(&self, new: NewNotification) -> Result<NotificationInsert> {
        self.check_writable()?;
        let mut state = self.state.lock();

        if new.notification_type.is_idempotent() {
            if let Some(existing) = unread_match(&state.notifications, &new.key()) {
                return Ok(NotificationInsert::Existing(existing.clone()));
            }
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: new.recipient_id,
            sender_id: new.sender_id,
            notification_type: new.notification_type,
            subject_ref: new.subject_ref,
            message: new.message,
            read: false,
            created_at: Utc::now(),
        };
        state.notifications.push(notification.clone());
        Ok(NotificationInsert::Created(notification))
    }

    async fn find_notification_by_key(&self, key: &NotificationKey) -> Result<Option<Notification>> {
        Ok(unread_match(&self.state.lock().notifications, key).cloned())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self
            .state
            .lock()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn list_notifications(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        let state = self.state.lock();
        let banned = |sender: Option<Uuid>| {
            sender
                .and_then(|id| state.users.get(&id))
                .map(|u| u.is_banned)
                .unwrap_or(false)
        };
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id && !banned(n.sender_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        if let Some(n) = self.state.lock().notifications.iter_mut().find(|n| n.id == id) {
            n.read = true;
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let mut changed = 0;
        for n in self
            .state
            .lock()
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn get_push_token(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.state.lock().push_tokens.get(&user_id).cloned())
    }

    async fn set_push_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        self.state
            .lock()
            .push_tokens
            .insert(user_id, token.to_string());
        Ok(())
    }

    async fn delete_push_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.push_tokens.get(&user_id).map(String::as_str) == Some(token) {
            state.push_tokens.remove(&user_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.state.lock().users.get(&user_id).cloned())
    }

    async fn record_presence(&self, user_id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()> {
        self.state.lock().presence_log.push((user_id, online, at));
        Ok(())
    }
}
