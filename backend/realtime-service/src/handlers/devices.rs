/// Device push-token registration
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{extract_user_id, ApiResponse};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PushTokenPayload {
    pub token: String,
}

/// Store the caller's device token, replacing any previous one
///
/// PUT /api/v1/users/push-token
pub async fn set_push_token(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PushTokenPayload>,
) -> Result<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    let token = body.token.trim();

    if !expo_push::is_expo_push_token(token) {
        return Err(AppError::Validation("not a valid Expo push token".to_string()));
    }

    state.store.set_push_token(user_id, token).await?;
    tracing::info!(%user_id, "Registered push token");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({ "success": true }))))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/users/push-token", web::put().to(set_push_token));
}
