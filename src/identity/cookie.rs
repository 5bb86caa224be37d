//! Refresh-cookie formatting and parsing.

use axum::http::{HeaderMap, HeaderValue};

use crate::error::{AppError, AppResult};

pub const REFRESH_COOKIE: &str = "agricult_refresh";

/// Cookie scope. The refresh token only ever needs to reach the auth endpoints.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub secure: bool,
    pub path: String,
    pub max_age: chrono::Duration,
}

impl CookieConfig {
    pub fn new(secure: bool, max_age: chrono::Duration) -> Self {
        Self { secure, path: "/api/auth".to_string(), max_age }
    }

    fn attributes(&self) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!("HttpOnly{secure}; SameSite=Strict; Path={}", self.path)
    }
}

pub fn refresh_cookie(token: &str, cfg: &CookieConfig) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Max-Age={}; {}",
        REFRESH_COOKIE,
        token,
        cfg.max_age.num_seconds().max(0),
        cfg.attributes()
    ))
    .map_err(|e| AppError::internal("cookie_encode".to_string(), e.to_string()))
}

pub fn clear_refresh_cookie(cfg: &CookieConfig) -> HeaderValue {
    // Only ASCII from constants and the configured path; a bad path falls back to a bare expiry.
    HeaderValue::from_str(&format!(
        "{}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; {}",
        REFRESH_COOKIE,
        cfg.attributes()
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("agricult_refresh=; Max-Age=0; Path=/api/auth"))
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(axum::http::header::COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_cookie_is_http_only_and_scoped() {
        let cfg = CookieConfig::new(false, chrono::Duration::days(7));
        let v = refresh_cookie("abc.def.ghi", &cfg).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("agricult_refresh=abc.def.ghi;"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("SameSite=Strict"));
        assert!(s.contains("Path=/api/auth"));
        assert!(s.contains("Max-Age=604800"));
        assert!(!s.contains("Secure"));

        let secure = CookieConfig::new(true, chrono::Duration::days(7));
        assert!(refresh_cookie("t", &secure).unwrap().to_str().unwrap().contains("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let s = clear_refresh_cookie(&CookieConfig::new(true, chrono::Duration::days(7)));
        let s = s.to_str().unwrap();
        assert!(s.starts_with("agricult_refresh=;"));
        assert!(s.contains("Max-Age=0"));
    }

    #[test]
    fn parse_cookie_finds_named_value() {
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("theme=dark; agricult_refresh=tok123; x=y"));
        assert_eq!(parse_cookie(&h, REFRESH_COOKIE).as_deref(), Some("tok123"));
        assert_eq!(parse_cookie(&h, "missing"), None);

        let mut empty = HeaderMap::new();
        empty.insert("cookie", HeaderValue::from_static("agricult_refresh="));
        assert_eq!(parse_cookie(&empty, REFRESH_COOKIE), None);
    }
}
