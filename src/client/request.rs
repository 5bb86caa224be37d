//! Authenticated request wrapper with a single silent-refresh retry.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::abort::AbortSignal;
use super::session::{SessionClient, SESSION_CHANGED};
use super::transport::{ApiRequest, ApiResponse};
use crate::error::{AppError, AppResult};

/// Which send this is. Passed explicitly so concurrent requests never share retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

#[derive(Clone)]
pub struct ApiClient {
    session: SessionClient,
}

fn bearer(token: &str) -> String { format!("Bearer {token}") }

impl ApiClient {
    pub fn new(session: SessionClient) -> Self { Self { session } }

    pub fn session(&self) -> &SessionClient { &self.session }

    async fn dispatch(&self, req: &ApiRequest, attempt: Attempt, token: Option<String>) -> AppResult<ApiResponse> {
        let mut outgoing = req.clone();
        match attempt {
            Attempt::First => {
                if outgoing.authorization.is_none() {
                    outgoing.authorization = token.as_deref().map(bearer);
                }
            }
            Attempt::Retried => outgoing.authorization = token.as_deref().map(bearer),
        }
        self.session.transport().execute(outgoing).await?.into_result()
    }

    /// Refresh after a stale-token rejection. A terminal refresh failure ends the session.
    async fn recover(&self, path: &str) -> AppResult<String> {
        match self.session.refresh().await {
            Ok(token) => Ok(token),
            // A newer session owns the state now; leave it alone.
            Err(err) if err.code_str() == SESSION_CHANGED => Err(err),
            Err(err) if err.is_terminal_auth() => {
                warn!(target: "session", path = %path, code = err.code_str(), "refresh failed; clearing session");
                self.session.clear_local();
                Err(AppError::InvalidSession { code: err.code_str().to_string(), message: err.message().to_string() })
            }
            Err(err) => Err(err),
        }
    }

    /// Send `req`, refreshing and retrying exactly once if the token was stale.
    pub async fn send(&self, req: ApiRequest) -> AppResult<ApiResponse> {
        match self.dispatch(&req, Attempt::First, self.session.access_token()).await {
            Err(AppError::Forbidden { code, .. }) => {
                debug!(target: "session", path = %req.path, code = %code, "stale token; refreshing");
                let token = self.recover(&req.path).await?;
                match self.dispatch(&req, Attempt::Retried, Some(token)).await {
                    Err(AppError::Forbidden { code, message }) => {
                        warn!(target: "session", path = %req.path, code = %code, "fresh token rejected; clearing session");
                        self.session.clear_local();
                        Err(AppError::Unauthenticated { code, message })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Like [`send`](Self::send), but gives up silently when `signal` fires. `Ok(None)` means
    /// the caller went away; it is not an error.
    pub async fn send_with_abort(&self, req: ApiRequest, signal: &AbortSignal) -> AppResult<Option<ApiResponse>> {
        tokio::select! {
            biased;
            _ = signal.aborted() => Ok(None),
            res = self.send(req) => res.map(Some),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn put_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> AppResult<T> {
        self.send(ApiRequest::put(path, body)).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> AppResult<T> {
        self.send(ApiRequest::post(path, body)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> AppResult<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }
}
