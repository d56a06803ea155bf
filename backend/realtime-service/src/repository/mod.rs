//! Persistence collaborator
//!
//! The delivery core only reaches durable state through [`Store`]. Two
//! implementations exist: [`PgStore`] for production and [`MemoryStore`] for
//! tests and database-less runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgStore, MIGRATOR};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DeliveryStatus, Message, NewMessage, NewNotification, Notification, NotificationInsert,
    NotificationKey, UserProfile,
};

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Persist a message with status `pending`
    async fn create_message(&self, new: NewMessage) -> Result<Message>;

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>>;

    /// Latest `limit` messages exchanged between two users, oldest first
    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid, limit: i64) -> Result<Vec<Message>>;

    /// Move a message forward. Returns `false` when the message is missing or
    /// the transition would go backwards.
    async fn update_message_status(&self, id: Uuid, status: DeliveryStatus) -> Result<bool>;

    /// Atomic check-then-insert. For idempotent types an existing unread row
    /// with the same key is returned instead of inserting.
    async fn create_notification_if_absent(&self, new: NewNotification) -> Result<NotificationInsert>;

    /// Unread notification with this key, if any
    async fn find_notification_by_key(&self, key: &NotificationKey) -> Result<Option<Notification>>;

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Newest first, excluding notifications from banned senders
    async fn list_notifications(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>>;

    async fn mark_notification_read(&self, id: Uuid) -> Result<()>;

    /// Returns the number of rows that changed
    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64>;

    async fn get_push_token(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn set_push_token(&self, user_id: Uuid, token: &str) -> Result<()>;

    /// Delete the user's token only if it still equals `token`, so a device
    /// that re-registered meanwhile keeps its new token.
    async fn delete_push_token(&self, user_id: Uuid, token: &str) -> Result<bool>;

    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn record_presence(&self, user_id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()>;
}
