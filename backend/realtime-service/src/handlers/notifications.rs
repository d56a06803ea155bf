use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{extract_user_id, ApiResponse};
use crate::error::Result;
use crate::services::NotifyRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// List the caller's notifications, newest first
///
/// GET /api/v1/notifications
pub async fn list_notifications(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    let views = state
        .notifications
        .list_notifications(user_id, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(views)))
}

/// Mark one notification read
///
/// PUT /api/v1/notifications/{id}/read
pub async fn mark_read(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    state
        .notifications
        .mark_read(user_id, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({ "success": true }))))
}

/// Mark all of the caller's notifications read
///
/// PUT /api/v1/notifications/read-all
pub async fn mark_all_read(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    let updated = state.notifications.mark_all_read(user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({ "updated": updated }))))
}

/// Domain-event trigger for collaborating services
///
/// POST /api/v1/notifications
pub async fn create_notification(
    state: web::Data<AppState>,
    body: web::Json<NotifyRequest>,
) -> Result<HttpResponse> {
    let result = state.notifications.notify(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(result)))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("", web::get().to(list_notifications))
            .route("", web::post().to(create_notification))
            .route("/read-all", web::put().to(mark_all_read))
            .route("/{id}/read", web::put().to(mark_read)),
    );
}
