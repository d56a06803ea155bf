use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Store;
use crate::error::{AppError, Result};
use crate::models::{
    DeliveryStatus, Message, NewMessage, NewNotification, Notification, NotificationInsert,
    NotificationKey, NotificationType, UserProfile,
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// A conflicting unread row can be marked read between our INSERT and the
/// follow-up lookup; retry a few times before giving up.
const IDEMPOTENT_INSERT_ATTEMPTS: usize = 3;

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, sender_id, notification_type, subject_ref, message, is_read, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;
        info!(max_connections, "Database pool created");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

fn message_from_row(row: &PgRow) -> Result<Message> {
    let status: String = row.try_get("delivery_status")?;
    Ok(Message {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        recipient_id: row.try_get("recipient_id")?,
        text: row.try_get("text")?,
        media_ref: row.try_get("media_ref")?,
        delivery_status: DeliveryStatus::parse(&status)
            .ok_or_else(|| AppError::Database(format!("unknown delivery status {status}")))?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.try_get("notification_type")?;
    Ok(Notification {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        sender_id: row.try_get("sender_id")?,
        notification_type: NotificationType::parse(&kind)
            .ok_or_else(|| AppError::Database(format!("unknown notification type {kind}")))?,
        subject_ref: row.try_get("subject_ref")?,
        message: row.try_get("message")?,
        read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgStore {
    async fn insert_notification(&self, new: &NewNotification, skip_on_conflict: bool) -> Result<Option<Notification>> {
        let conflict = if skip_on_conflict { "ON CONFLICT DO NOTHING" } else { "" };
        let query = format!(
            r#"
            INSERT INTO notifications (
                id, recipient_id, sender_id, notification_type, subject_ref,
                message, is_read, idempotent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, NOW())
            {conflict}
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(new.recipient_id)
            .bind(new.sender_id)
            .bind(new.notification_type.as_str())
            .bind(&new.subject_ref)
            .bind(&new.message)
            .bind(new.notification_type.is_idempotent())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(notification_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let row = sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, text, media_ref, delivery_status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', NOW())
            RETURNING id, sender_id, recipient_id, text, media_ref, delivery_status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.sender_id)
        .bind(new.recipient_id)
        .bind(&new.payload.text)
        .bind(&new.payload.media_ref)
        .fetch_one(&self.pool)
        .await?;

        message_from_row(&row)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query(
            r#"
            SELECT id, sender_id, recipient_id, text, media_ref, delivery_status, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_conversation(&self, user_a: Uuid, user_b: Uuid, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender_id, recipient_id, text, media_ref, delivery_status, created_at
            FROM (
                SELECT id, sender_id, recipient_id, text, media_ref, delivery_status, created_at
                FROM messages
                WHERE (sender_id = $1 AND recipient_id = $2)
                   OR (sender_id = $2 AND recipient_id = $1)
                ORDER BY created_at DESC, id DESC
                LIMIT $3
            ) recent
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn update_message_status(&self, id: Uuid, status: DeliveryStatus) -> Result<bool> {
        let predecessors: Vec<String> = status
            .allowed_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET delivery_status = $2, updated_at = NOW()
            WHERE id = $1 AND delivery_status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&predecessors)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if !applied {
            debug!(message_id = %id, status = status.as_str(), "Status transition not applied");
        }
        Ok(applied)
    }

    async fn create_notification_if_absent(&self, new: NewNotification) -> Result<NotificationInsert> {
        if !new.notification_type.is_idempotent() {
            let created = self
                .insert_notification(&new, false)
                .await?
                .ok_or(AppError::Internal)?;
            return Ok(NotificationInsert::Created(created));
        }

        let key = new.key();
        for attempt in 1..=IDEMPOTENT_INSERT_ATTEMPTS {
            if let Some(created) = self.insert_notification(&new, true).await? {
                return Ok(NotificationInsert::Created(created));
            }
            if let Some(existing) = self.find_notification_by_key(&key).await? {
                return Ok(NotificationInsert::Existing(existing));
            }
            warn!(attempt, recipient_id = %new.recipient_id, "Notification conflict vanished, retrying insert");
        }

        Err(AppError::Database(
            "notification insert kept conflicting".to_string(),
        ))
    }

    async fn find_notification_by_key(&self, key: &NotificationKey) -> Result<Option<Notification>> {
        let query = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE recipient_id = $1
              AND sender_id IS NOT DISTINCT FROM $2
              AND notification_type = $3
              AND subject_ref IS NOT DISTINCT FROM $4
              AND idempotent AND NOT is_read
            LIMIT 1
            "#
        );

        let row = sqlx::query(&query)
            .bind(key.recipient_id)
            .bind(key.sender_id)
            .bind(key.notification_type.as_str())
            .bind(&key.subject_ref)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        let query = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list_notifications(&self, recipient_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT n.id, n.recipient_id, n.sender_id, n.notification_type, n.subject_ref,
                   n.message, n.is_read, n.created_at
            FROM notifications n
            LEFT JOIN users u ON u.id = n.sender_id
            WHERE n.recipient_id = $1
              AND NOT COALESCE(u.is_banned, FALSE)
            ORDER BY n.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(recipient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_push_token(&self, user_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT token FROM push_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("token")))
    }

    async fn set_push_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO push_tokens (user_id, token, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_push_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_tokens WHERE user_id = $1 AND token = $2")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, display_name, avatar_url, is_banned FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<UserProfile> {
            Ok(UserProfile {
                user_id: r.try_get("id")?,
                display_name: r.try_get("display_name")?,
                avatar_url: r.try_get("avatar_url")?,
                is_banned: r.try_get("is_banned")?,
            })
        })
        .transpose()
    }

    async fn record_presence(&self, user_id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET is_online = $2, last_seen_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(online)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
