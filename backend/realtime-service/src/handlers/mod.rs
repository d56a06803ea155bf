/// HTTP handlers for the realtime service API
pub mod devices;
pub mod messages;
pub mod moderation;
pub mod notifications;
pub mod websocket;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Set by the upstream gateway after it validated the caller's credentials.
pub const USER_ID_HEADER: &str = "x-user-id";

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

pub fn extract_user_id(req: &HttpRequest) -> Result<Uuid> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(AppError::Unauthorized)
}

/// GET /health
///
/// Unhealthy once a background worker has exited.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    if state.workers_alive() {
        HttpResponse::Ok().body("OK")
    } else {
        HttpResponse::ServiceUnavailable().body("background worker stopped")
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    messages::register_routes(cfg);
    notifications::register_routes(cfg);
    devices::register_routes(cfg);
    moderation::register_routes(cfg);
    websocket::register_routes(cfg);
}
