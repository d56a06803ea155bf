//! PgStore against a real database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test --test postgres_store_tests -- --ignored`.
//! Each test gets a fresh database with the service migrations applied.

use chrono::Utc;
use realtime_service::models::{
    DeliveryStatus, MessagePayload, NewMessage, NewNotification, NotificationInsert,
    NotificationType,
};
use realtime_service::{PgStore, Store};
use sqlx::PgPool;
use uuid::Uuid;

fn like(recipient_id: Uuid, sender_id: Uuid, post: &str) -> NewNotification {
    NewNotification {
        recipient_id,
        sender_id: Some(sender_id),
        notification_type: NotificationType::LikePost,
        subject_ref: Some(post.to_string()),
        message: Some("liked your post".to_string()),
    }
}

async fn insert_user(pool: &PgPool, id: Uuid, name: &str) {
    sqlx::query("INSERT INTO users (id, display_name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

async fn count_notifications(pool: &PgPool, recipient_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1")
        .bind(recipient_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn new_message(store: &PgStore, from: Uuid, to: Uuid, text: &str) -> Uuid {
    store
        .create_message(NewMessage {
            sender_id: from,
            recipient_id: to,
            payload: MessagePayload::text(text),
        })
        .await
        .unwrap()
        .id
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_like_returns_existing(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let (owner, fan) = (Uuid::new_v4(), Uuid::new_v4());

    let first = store.create_notification_if_absent(like(owner, fan, "post-1")).await.unwrap();
    let second = store.create_notification_if_absent(like(owner, fan, "post-1")).await.unwrap();

    let first = match first {
        NotificationInsert::Created(n) => n,
        other => panic!("expected insert, got {other:?}"),
    };
    match second {
        NotificationInsert::Existing(n) => assert_eq!(n.id, first.id),
        other => panic!("expected existing row, got {other:?}"),
    }
    assert_eq!(count_notifications(&pool, owner).await, 1);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_missing_sender_and_subject_share_a_key(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let user = Uuid::new_v4();
    let banned = NewNotification {
        recipient_id: user,
        sender_id: None,
        notification_type: NotificationType::AccountBanned,
        subject_ref: None,
        message: None,
    };

    assert!(store.create_notification_if_absent(banned.clone()).await.unwrap().was_created());
    assert!(!store.create_notification_if_absent(banned).await.unwrap().was_created());
    assert_eq!(count_notifications(&pool, user).await, 1);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_read_row_allows_new_insert(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let (owner, fan) = (Uuid::new_v4(), Uuid::new_v4());

    let first = store
        .create_notification_if_absent(like(owner, fan, "post-1"))
        .await
        .unwrap()
        .into_inner();
    store.mark_notification_read(first.id).await.unwrap();

    let again = store.create_notification_if_absent(like(owner, fan, "post-1")).await.unwrap();
    assert!(again.was_created());
    assert_ne!(again.into_inner().id, first.id);
    assert_eq!(count_notifications(&pool, owner).await, 2);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_comments_bypass_unique_index(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let (owner, commenter) = (Uuid::new_v4(), Uuid::new_v4());
    let comment = NewNotification {
        notification_type: NotificationType::CommentPost,
        ..like(owner, commenter, "post-1")
    };

    assert!(store.create_notification_if_absent(comment.clone()).await.unwrap().was_created());
    assert!(store.create_notification_if_absent(comment).await.unwrap().was_created());
    assert_eq!(count_notifications(&pool, owner).await, 2);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_inserts_create_one_row(pool: PgPool) {
    let store = std::sync::Arc::new(PgStore::new(pool.clone()));
    let (owner, fan) = (Uuid::new_v4(), Uuid::new_v4());

    let results = futures::future::join_all((0..8).map(|_| {
        let store = store.clone();
        async move { store.create_notification_if_absent(like(owner, fan, "post-1")).await }
    }))
    .await;

    let created = results
        .iter()
        .filter(|r| r.as_ref().unwrap().was_created())
        .count();
    assert_eq!(created, 1);
    assert_eq!(count_notifications(&pool, owner).await, 1);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_status_only_moves_forward(pool: PgPool) {
    let store = PgStore::new(pool);
    let id = new_message(&store, Uuid::new_v4(), Uuid::new_v4(), "hi").await;

    assert!(store.update_message_status(id, DeliveryStatus::QueuedPush).await.unwrap());
    assert!(store.update_message_status(id, DeliveryStatus::PushSent).await.unwrap());
    assert!(!store.update_message_status(id, DeliveryStatus::PushFailed).await.unwrap());
    assert!(!store.update_message_status(id, DeliveryStatus::Pending).await.unwrap());
    assert!(!store
        .update_message_status(Uuid::new_v4(), DeliveryStatus::PushSent)
        .await
        .unwrap());

    let stored = store.get_message(id).await.unwrap().unwrap();
    assert_eq!(stored.delivery_status, DeliveryStatus::PushSent);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_pending_may_skip_to_push_failed(pool: PgPool) {
    let store = PgStore::new(pool);
    let id = new_message(&store, Uuid::new_v4(), Uuid::new_v4(), "hi").await;

    assert!(store.update_message_status(id, DeliveryStatus::PushFailed).await.unwrap());
    assert!(!store.update_message_status(id, DeliveryStatus::DeliveredLive).await.unwrap());
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_token_delete_keeps_rotated_token(pool: PgPool) {
    let store = PgStore::new(pool);
    let user = Uuid::new_v4();
    store.set_push_token(user, "ExponentPushToken[old]").await.unwrap();
    store.set_push_token(user, "ExponentPushToken[new]").await.unwrap();

    assert!(!store.delete_push_token(user, "ExponentPushToken[old]").await.unwrap());
    assert_eq!(
        store.get_push_token(user).await.unwrap().as_deref(),
        Some("ExponentPushToken[new]")
    );

    assert!(store.delete_push_token(user, "ExponentPushToken[new]").await.unwrap());
    assert_eq!(store.get_push_token(user).await.unwrap(), None);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_listing_hides_banned_senders(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let (owner, good, bad) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    insert_user(&pool, good, "Good").await;
    insert_user(&pool, bad, "Bad").await;
    store.create_notification_if_absent(like(owner, good, "p1")).await.unwrap();
    store.create_notification_if_absent(like(owner, bad, "p2")).await.unwrap();
    sqlx::query("UPDATE users SET is_banned = TRUE WHERE id = $1")
        .bind(bad)
        .execute(&pool)
        .await
        .unwrap();

    let listed = store.list_notifications(owner, 50).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].sender_id, Some(good));

    assert_eq!(store.mark_all_notifications_read(owner).await.unwrap(), 2);
    assert_eq!(store.mark_all_notifications_read(owner).await.unwrap(), 0);
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_conversation_is_oldest_first(pool: PgPool) {
    let store = PgStore::new(pool);
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    new_message(&store, a, b, "1").await;
    new_message(&store, b, a, "2").await;
    new_message(&store, a, c, "other").await;
    new_message(&store, a, b, "3").await;

    let texts: Vec<String> = store
        .list_conversation(b, a, 50)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["1", "2", "3"]);

    let latest = store.list_conversation(a, b, 1).await.unwrap();
    assert_eq!(latest[0].text.as_deref(), Some("3"));
}

#[sqlx::test(migrator = "realtime_service::repository::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn test_profile_and_presence(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let user = Uuid::new_v4();
    insert_user(&pool, user, "Alice").await;

    let profile = store.get_user_profile(user).await.unwrap().unwrap();
    assert_eq!(profile.display_name, "Alice");
    assert!(!profile.is_banned);
    assert!(store.get_user_profile(Uuid::new_v4()).await.unwrap().is_none());

    store.record_presence(user, true, Utc::now()).await.unwrap();
    let online: bool = sqlx::query_scalar("SELECT is_online FROM users WHERE id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(online);
}
