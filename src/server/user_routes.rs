//! Protected handlers under `/api/user` and `/api/admin`.

use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;
use tracing::info;

use super::{blocking, AppState};
use crate::error::{AppError, AppResult};
use crate::identity::{clear_refresh_cookie, normalize_phone, Identity, ProfileUpdate, RequestContext};

pub async fn get_profile(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> AppResult<Json<Identity>> {
    state
        .users
        .get(&ctx.principal.subject)
        .map(Json)
        .ok_or_else(|| AppError::not_found("user_not_found", "account not found"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Identity>> {
    let users = state.users.clone();
    let subject = ctx.principal.subject.clone();
    let user = blocking(move || users.update_profile(&subject, update)).await?;
    info!(target: "auth", subject = %user.phone, profile_complete = user.is_profile_complete(), "profile saved");
    Ok(Json(user))
}

/// Delete the caller's own account and drop their refresh cookie.
pub async fn delete_account(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> AppResult<impl IntoResponse> {
    let users = state.users.clone();
    let subject = ctx.principal.subject.clone();
    if !blocking(move || users.delete(&subject)).await? {
        return Err(AppError::not_found("user_not_found", "account not found"));
    }
    info!(target: "auth", subject = %ctx.principal.subject, "account deleted");
    Ok((StatusCode::OK, [(SET_COOKIE, clear_refresh_cookie(&state.cookies))], Json(json!({ "status": "ok" }))))
}

pub async fn list_users(State(state): State<AppState>) -> Json<Vec<Identity>> {
    Json(state.users.list())
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(phone): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let phone = normalize_phone(&phone)?;
    let users = state.users.clone();
    let target = phone.clone();
    if !blocking(move || users.delete(&target)).await? {
        return Err(AppError::not_found("user_not_found".to_string(), format!("no user {phone}")));
    }
    info!(target: "auth", actor = %ctx.principal.subject, subject = %phone, "user deleted by admin");
    Ok(Json(json!({ "status": "ok", "deleted": phone })))
}
