/// Moderation decision endpoints
///
/// The caller (x-user-id) is the acting moderator; authorization happens
/// upstream.
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{extract_user_id, ApiResponse};
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OwnerDecision {
    pub owner_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BanPayload {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationDecision {
    pub approved: bool,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportPayload {
    pub recipient_id: Uuid,
    pub subject_ref: String,
    pub reason: Option<String>,
}

/// POST /api/v1/moderation/posts/{post_id}/approve
pub async fn approve_post(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<OwnerDecision>,
) -> Result<HttpResponse> {
    let admin_id = extract_user_id(&req)?;
    let notification = state
        .moderation
        .approve_post(admin_id, &path, body.owner_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

/// POST /api/v1/moderation/posts/{post_id}/reject
pub async fn reject_post(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<OwnerDecision>,
) -> Result<HttpResponse> {
    let admin_id = extract_user_id(&req)?;
    let body = body.into_inner();
    let notification = state
        .moderation
        .reject_post(admin_id, &path, body.owner_id, body.reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

/// POST /api/v1/moderation/photos/{photo_id}/approve
pub async fn approve_photo(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<OwnerDecision>,
) -> Result<HttpResponse> {
    let admin_id = extract_user_id(&req)?;
    let notification = state
        .moderation
        .approve_photo(admin_id, &path, body.owner_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

/// POST /api/v1/moderation/photos/{photo_id}/deny
pub async fn deny_photo(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<OwnerDecision>,
) -> Result<HttpResponse> {
    let admin_id = extract_user_id(&req)?;
    let body = body.into_inner();
    let notification = state
        .moderation
        .deny_photo(admin_id, &path, body.owner_id, body.reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

/// POST /api/v1/moderation/users/{user_id}/ban
pub async fn ban_account(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<BanPayload>,
) -> Result<HttpResponse> {
    let admin_id = extract_user_id(&req)?;
    let notification = state
        .moderation
        .ban_account(admin_id, path.into_inner(), body.into_inner().reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

/// POST /api/v1/moderation/users/{user_id}/verification
pub async fn decide_verification(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<VerificationDecision>,
) -> Result<HttpResponse> {
    let admin_id = extract_user_id(&req)?;
    let body = body.into_inner();
    let notification = state
        .moderation
        .decide_verification(admin_id, path.into_inner(), body.approved, body.message)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

/// POST /api/v1/moderation/reports
pub async fn report_filed(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ReportPayload>,
) -> Result<HttpResponse> {
    let reporter_id = extract_user_id(&req)?;
    let body = body.into_inner();
    let notification = state
        .moderation
        .report_filed(reporter_id, body.recipient_id, &body.subject_ref, body.reason)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(notification)))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/moderation")
            .route("/posts/{post_id}/approve", web::post().to(approve_post))
            .route("/posts/{post_id}/reject", web::post().to(reject_post))
            .route("/photos/{photo_id}/approve", web::post().to(approve_photo))
            .route("/photos/{photo_id}/deny", web::post().to(deny_photo))
            .route("/users/{user_id}/ban", web::post().to(ban_account))
            .route("/users/{user_id}/verification", web::post().to(decide_verification))
            .route("/reports", web::post().to(report_filed)),
    );
}
