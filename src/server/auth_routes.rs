//! `/api/auth/*` handlers: OTP login, silent refresh, logout.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{blocking, AppState};
use crate::error::{AppError, AppResult};
use crate::identity::{clear_refresh_cookie, parse_cookie, refresh_cookie, Identity, LoginRequest, REFRESH_COOKIE};

#[derive(Debug, Deserialize)]
pub struct SendOtpPayload {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpPayload {
    pub phone: String,
    pub otp: String,
}

/// Body of login and refresh responses. The refresh token is never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub user: Identity,
}

pub async fn send_otp(State(state): State<AppState>, Json(payload): Json<SendOtpPayload>) -> AppResult<Json<serde_json::Value>> {
    let provider = state.provider.clone();
    let dev_code = blocking(move || provider.request_code(&payload.phone)).await?;
    let mut body = json!({ "status": "ok" });
    if let Some(code) = dev_code {
        body["devOtp"] = json!(code);
    }
    Ok(Json(body))
}

pub async fn verify_otp(State(state): State<AppState>, Json(payload): Json<VerifyOtpPayload>) -> AppResult<Response> {
    let provider = state.provider.clone();
    let req = LoginRequest { phone: payload.phone, otp: payload.otp };
    let grant = blocking(move || provider.login(&req)).await?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, refresh_cookie(&grant.refresh_token, &state.cookies)?);
    let body = TokenResponse { access_token: grant.access_token, user: grant.identity };
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = parse_cookie(&headers, REFRESH_COOKIE);
    match state.issuer.refresh(cookie.as_deref(), &state.users) {
        Ok(grant) => {
            let set = match refresh_cookie(&grant.refresh_token, &state.cookies) {
                Ok(v) => v,
                Err(e) => return e.into_response(),
            };
            let body = TokenResponse { access_token: grant.access_token, user: grant.identity };
            (StatusCode::OK, [(SET_COOKIE, set)], Json(body)).into_response()
        }
        Err(err) => {
            let mut resp = err.clone().into_response();
            // A dead cookie is removed so the browser stops presenting it.
            if matches!(err, AppError::InvalidSession { .. }) {
                resp.headers_mut().insert(SET_COOKIE, clear_refresh_cookie(&state.cookies));
            }
            resp
        }
    }
}

/// Always 200: the goal is a logged-out client, whatever state the cookie was in.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let cookie = parse_cookie(&headers, REFRESH_COOKIE);
    state.issuer.logout(cookie.as_deref());
    (StatusCode::OK, [(SET_COOKIE, clear_refresh_cookie(&state.cookies))], Json(json!({ "status": "ok" })))
}
