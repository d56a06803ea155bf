/// Message Delivery Pipeline
///
/// Persist first, then try the live path, then fall back to push. A failed
/// write aborts before any delivery; a failed live delivery only changes the
/// path taken.
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EventRouter, PushDispatcher, PushRequest};
use crate::error::{AppError, Result};
use crate::models::{DeliveryStatus, Message, MessagePayload, MessageView, NewMessage, UserSummary};
use crate::repository::Store;
use crate::websocket::ServerEvent;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

pub struct MessageService {
    store: Arc<dyn Store>,
    router: EventRouter,
    dispatcher: Arc<PushDispatcher>,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>, router: EventRouter, dispatcher: Arc<PushDispatcher>) -> Self {
        Self {
            store,
            router,
            dispatcher,
        }
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        payload: MessagePayload,
    ) -> Result<Message> {
        payload.validate()?;
        let payload = MessagePayload::new(payload.text, payload.media_ref);

        let mut message = self
            .store
            .create_message(NewMessage {
                sender_id,
                recipient_id,
                payload,
            })
            .await?;

        let sender = self.sender_summary(sender_id).await;
        let view = MessageView::new(&message, sender.clone());

        let delivered = self.router.send_to_user(
            recipient_id,
            ServerEvent::MessageReceived {
                message: view.clone(),
            },
        );

        if delivered {
            self.advance(&mut message, DeliveryStatus::DeliveredLive).await;
            info!(message_id = %message.id, %recipient_id, "Message delivered live");
        } else {
            self.advance(&mut message, DeliveryStatus::QueuedPush).await;
            self.dispatcher.enqueue(PushRequest {
                recipient_id,
                title: sender.display_name.clone(),
                body: message.payload().preview(),
                data: json!({
                    "type": "message",
                    "conversation_id": sender_id,
                    "sender_id": sender_id,
                    "message_id": message.id,
                }),
                message_id: Some(message.id),
            });
            info!(message_id = %message.id, %recipient_id, "Recipient offline, message queued for push");
        }

        // Other devices of the sender.
        if sender_id != recipient_id {
            self.router
                .send_to_user(sender_id, ServerEvent::MessageReceived { message: view });
        }

        Ok(message)
    }

    /// Conversation between the caller and `other_id`, oldest first
    pub async fn conversation(
        &self,
        caller_id: Uuid,
        other_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        self.store.list_conversation(caller_id, other_id, limit).await
    }

    /// Re-read a persisted message; only its sender and recipient may see it.
    pub async fn get_message(&self, caller_id: Uuid, message_id: Uuid) -> Result<Message> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if message.sender_id != caller_id && message.recipient_id != caller_id {
            return Err(AppError::Forbidden);
        }
        Ok(message)
    }

    /// Best-effort status write; the message has already been persisted.
    async fn advance(&self, message: &mut Message, status: DeliveryStatus) {
        match self.store.update_message_status(message.id, status).await {
            Ok(true) => message.delivery_status = status,
            Ok(false) => debug!(message_id = %message.id, status = status.as_str(), "Status transition skipped"),
            Err(e) => warn!(message_id = %message.id, error = %e, "Failed to update message status"),
        }
    }

    async fn sender_summary(&self, sender_id: Uuid) -> UserSummary {
        match self.store.get_user_profile(sender_id).await {
            Ok(Some(profile)) => profile.into(),
            Ok(None) => UserSummary::fallback(sender_id),
            Err(e) => {
                warn!(%sender_id, error = %e, "Sender profile lookup failed");
                UserSummary::fallback(sender_id)
            }
        }
    }
}
