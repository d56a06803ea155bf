/// WebSocket upgrade and connection status endpoints
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Serialize;
use uuid::Uuid;

use super::ApiResponse;
use crate::state::AppState;
use crate::websocket::WsSession;

#[derive(Debug, Serialize)]
pub struct PresenceStatus {
    pub user_id: Uuid,
    pub online: bool,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    pub online_users: usize,
    pub sessions: usize,
}

/// GET /ws
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    ws::start(WsSession::new(state.get_ref().clone()), &req, stream)
}

/// GET /api/v1/presence/{user_id}
pub async fn presence_status(state: web::Data<AppState>, path: web::Path<Uuid>) -> HttpResponse {
    let user_id = path.into_inner();
    HttpResponse::Ok().json(ApiResponse::ok(PresenceStatus {
        user_id,
        online: state.registry.is_online(user_id),
        sessions: state.registry.session_count_for(user_id),
    }))
}

/// GET /api/v1/ws/stats
pub async fn connection_stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(ConnectionStats {
        online_users: state.registry.user_count(),
        sessions: state.registry.session_count(),
    }))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_connect))
        .route("/api/v1/presence/{user_id}", web::get().to(presence_status))
        .route("/api/v1/ws/stats", web::get().to(connection_stats));
}
