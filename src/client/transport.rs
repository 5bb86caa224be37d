//! Wire layer for the session client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// An outgoing API call. Immutable once built; each attempt works on its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Full `Authorization` header value. Left `None`, the wrapper attaches the session's bearer.
    pub authorization: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, authorization: None }
    }
    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::Get, path) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::Delete, path) }
    pub fn post(path: impl Into<String>, body: Value) -> Self { Self::new(Method::Post, path).with_body(body) }
    pub fn put(path: impl Into<String>, body: Value) -> Self { Self::new(Method::Put, path).with_body(body) }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    /// Turn non-2xx responses into the matching [`AppError`].
    pub fn into_result(self) -> AppResult<Self> {
        if self.is_success() { Ok(self) } else { Err(AppError::from_response(self.status, &self.body)) }
    }

    pub fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| AppError::internal("decode_error".to_string(), e.to_string()))
    }
}

/// Body of the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBody {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<Identity>,
}

/// What the session client needs from the server.
#[async_trait]
pub trait AuthTransport: Send + Sync + 'static {
    /// Credentialed `POST /api/auth/refresh`.
    async fn refresh(&self) -> AppResult<TokenBody>;
    /// `POST /api/auth/logout`.
    async fn logout(&self) -> AppResult<()>;
    /// Send one request as-is. Non-2xx statuses are returned, not raised.
    async fn execute(&self, req: ApiRequest) -> AppResult<ApiResponse>;
}

/// reqwest transport with a cookie jar, so the httpOnly refresh cookie rides along on
/// credentialed auth calls without the caller ever seeing it.
#[derive(Clone)]
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base: &str) -> AppResult<Self> {
        Self::with_jar(base, Arc::new(Jar::default()))
    }

    /// Share a cookie jar between transports (same browser, several tabs or origins).
    pub fn with_jar(base: &str, jar: Arc<Jar>) -> AppResult<Self> {
        let base = Url::parse(base).map_err(|e| AppError::user("invalid_base_url".to_string(), e.to_string()))?;
        let client = reqwest::Client::builder().cookie_provider(jar).build()?;
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url { &self.base }

    async fn call(&self, method: Method, path: &str, body: Option<&Value>, authorization: Option<&str>) -> AppResult<ApiResponse> {
        let url = self.base.join(path).map_err(|e| AppError::user("invalid_path".to_string(), e.to_string()))?;
        let mut rb = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(auth) = authorization {
            rb = rb.header(reqwest::header::AUTHORIZATION, auth);
        }
        if let Some(b) = body {
            rb = rb.json(b);
        }
        let resp = rb.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text).unwrap_or(Value::String(text)) };
        Ok(ApiResponse { status, body })
    }

    /// Ask the server to send a login code. Returns the code when the server echoes it.
    pub async fn request_otp(&self, phone: &str) -> AppResult<Option<String>> {
        let resp = self.call(Method::Post, "/api/auth/send-otp", Some(&serde_json::json!({ "phone": phone })), None).await?.into_result()?;
        Ok(resp.body.get("devOtp").and_then(|v| v.as_str()).map(str::to_string))
    }

    /// Exchange a code for an access token. The refresh cookie lands in the jar.
    pub async fn verify_otp(&self, phone: &str, otp: &str) -> AppResult<(String, Identity)> {
        let body = serde_json::json!({ "phone": phone, "otp": otp });
        let resp = self.call(Method::Post, "/api/auth/verify-otp", Some(&body), None).await?.into_result()?;
        let tokens: TokenBody = resp.json()?;
        let user = tokens.user.ok_or_else(|| AppError::internal("decode_error", "login response without user"))?;
        Ok((tokens.access_token, user))
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn refresh(&self) -> AppResult<TokenBody> {
        self.call(Method::Post, "/api/auth/refresh", None, None).await?.into_result()?.json()
    }

    async fn logout(&self) -> AppResult<()> {
        self.call(Method::Post, "/api/auth/logout", None, None).await?.into_result().map(|_| ())
    }

    async fn execute(&self, req: ApiRequest) -> AppResult<ApiResponse> {
        self.call(req.method, &req.path, req.body.as_ref(), req.authorization.as_deref()).await
    }
}
