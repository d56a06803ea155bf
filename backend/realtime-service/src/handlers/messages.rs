use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{extract_user_id, ApiResponse};
use crate::error::Result;
use crate::models::MessagePayload;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    #[validate(length(max = 5000))]
    pub text: Option<String>,
    #[validate(length(max = 2048))]
    pub media_ref: Option<String>,
}

/// Send a direct message
///
/// POST /api/v1/messages
pub async fn send_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let sender_id = extract_user_id(&req)?;
    body.validate()?;
    let body = body.into_inner();

    let message = state
        .messages
        .send_message(
            sender_id,
            body.recipient_id,
            MessagePayload::new(body.text, body.media_ref),
        )
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(message)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Conversation with another user, oldest first
///
/// GET /api/v1/messages/{user_id}
pub async fn get_conversation(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse> {
    let caller_id = extract_user_id(&req)?;
    let messages = state
        .messages
        .conversation(caller_id, path.into_inner(), query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(messages)))
}

/// Re-fetch one message after a live event
///
/// GET /api/v1/messages/by-id/{message_id}
pub async fn get_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let caller_id = extract_user_id(&req)?;
    let message = state.messages.get_message(caller_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(message)))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/messages", web::post().to(send_message))
        .route("/api/v1/messages/by-id/{message_id}", web::get().to(get_message))
        .route("/api/v1/messages/{user_id}", web::get().to(get_conversation));
}
