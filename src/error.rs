//! Unified application error model and mapping helpers.
//! The same enum is produced by server handlers, rendered as the JSON error body, and parsed
//! back by the session client so both sides agree on the failure taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// No credential was presented.
    #[error("{code}: {message}")]
    Unauthenticated { code: String, message: String },
    /// A credential was presented but is stale or invalid; worth one silent refresh.
    #[error("{code}: {message}")]
    Forbidden { code: String, message: String },
    /// The refresh cookie itself is unusable. Terminal.
    #[error("{code}: {message}")]
    InvalidSession { code: String, message: String },
    /// Valid credential, insufficient role.
    #[error("{code}: {message}")]
    AccessDenied { code: String, message: String },
    #[error("{code}: {message}")]
    Network { code: String, message: String },
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::InvalidSession { code, .. }
            | AppError::AccessDenied { code, .. }
            | AppError::Network { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::InvalidSession { message, .. }
            | AppError::AccessDenied { message, .. }
            | AppError::Network { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn invalid_session<S: Into<String>>(code: S, msg: S) -> Self { AppError::InvalidSession { code: code.into(), message: msg.into() } }
    pub fn access_denied<S: Into<String>>(code: S, msg: S) -> Self { AppError::AccessDenied { code: code.into(), message: msg.into() } }
    pub fn network<S: Into<String>>(code: S, msg: S) -> Self { AppError::Network { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::InvalidSession { .. } => 401,
            AppError::AccessDenied { .. } => 403,
            AppError::Network { .. } => 503,
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Internal { .. } => 500,
        }
    }

    /// True for failures after which the client must drop its session and go to login.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, AppError::Unauthenticated { .. } | AppError::InvalidSession { .. })
    }

    /// Rebuild an error from a non-success HTTP response.
    ///
    /// Prefers the tagged error body; falls back to the status code so that a bare 403 from a
    /// proxy still reads as a stale credential.
    pub fn from_response(status: u16, body: &serde_json::Value) -> Self {
        if let Some(err) = body.get("error").cloned() {
            if let Ok(parsed) = serde_json::from_value::<AppError>(err) {
                return parsed;
            }
        }
        let text = body.to_string();
        match status {
            401 => AppError::unauthenticated("unauthenticated".to_string(), text),
            403 => AppError::forbidden("forbidden".to_string(), text),
            404 => AppError::not_found("not_found".to_string(), text),
            400..=499 => AppError::user(format!("http_{status}"), text),
            502..=504 => AppError::network(format!("http_{status}"), text),
            _ => AppError::internal(format!("http_{status}"), text),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network { code: "network_error".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "status": "error", "error": self }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::unauthenticated("missing_token", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("stale_token", "old").http_status(), 403);
        assert_eq!(AppError::invalid_session("bad_refresh", "x").http_status(), 401);
        assert_eq!(AppError::access_denied("admin_only", "x").http_status(), 403);
        assert_eq!(AppError::network("io", "down").http_status(), 503);
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn tagged_body_round_trips_through_from_response() {
        let err = AppError::access_denied("admin_only", "admin role required");
        let body = serde_json::json!({ "status": "error", "error": err.clone() });
        assert_eq!(body["error"]["type"], "access_denied");
        assert_eq!(AppError::from_response(403, &body), err);
    }

    #[test]
    fn bare_status_falls_back_by_code() {
        let body = serde_json::json!("gateway says no");
        assert!(matches!(AppError::from_response(403, &body), AppError::Forbidden { .. }));
        assert!(matches!(AppError::from_response(401, &body), AppError::Unauthenticated { .. }));
        assert!(matches!(AppError::from_response(502, &body), AppError::Network { .. }));
        assert!(matches!(AppError::from_response(500, &body), AppError::Internal { .. }));
    }

    #[test]
    fn terminal_auth_classification() {
        assert!(AppError::invalid_session("a", "b").is_terminal_auth());
        assert!(AppError::unauthenticated("a", "b").is_terminal_auth());
        assert!(!AppError::forbidden("a", "b").is_terminal_auth());
        assert!(!AppError::network("a", "b").is_terminal_auth());
    }
}
