//!
//! Agri-Cult HTTP server
//! ---------------------
//! This module defines the Axum-based REST API for the session subsystem.
//!
//! Responsibilities:
//! - OTP login that creates identities and issues an access token plus a refresh cookie.
//! - Silent refresh and idempotent logout over the httpOnly refresh cookie.
//! - Bearer verification on every protected route, with an admin gate under `/api/admin`.
//! - Profile read/save and account deletion for the signed-in user.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use tracing::info;

use crate::config::{AuthConfig, Config};
use crate::error::{AppError, AppResult};
use crate::identity::{AuthProvider, CookieConfig, LogOtpSender, OtpAuthProvider, OtpSender, OtpStore, TokenIssuer, UserStore};

pub mod middleware;
pub mod auth_routes;
pub mod user_routes;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub issuer: TokenIssuer,
    pub provider: Arc<dyn AuthProvider>,
    pub otps: OtpStore,
    pub cookies: CookieConfig,
}

impl AppState {
    pub fn new(cfg: &AuthConfig, users: UserStore) -> Self {
        Self::with_sender(cfg, users, Arc::new(LogOtpSender))
    }

    pub fn with_sender(cfg: &AuthConfig, users: UserStore, sender: Arc<dyn OtpSender>) -> Self {
        let issuer = TokenIssuer::new(cfg);
        let provider = OtpAuthProvider::new(cfg, users.clone(), issuer.clone(), sender);
        let otps = provider.otps().clone();
        Self {
            users,
            issuer,
            provider: Arc::new(provider),
            otps,
            cookies: CookieConfig::new(cfg.secure_cookies, cfg.refresh_ttl),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/send-otp", post(auth_routes::send_otp))
        .route("/verify-otp", post(auth_routes::verify_otp))
        .route("/refresh", post(auth_routes::refresh))
        .route("/logout", post(auth_routes::logout));

    let user = Router::new()
        .route(
            "/profile",
            get(user_routes::get_profile).put(user_routes::update_profile).delete(user_routes::delete_account),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    // Layers run outside-in: verify the bearer first, then check the role.
    let admin = Router::new()
        .route("/users", get(user_routes::list_users))
        .route("/users/{phone}", delete(user_routes::delete_user))
        .route_layer(from_fn(middleware::require_admin))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/", get(|| async { "agri-cult ok" }))
        .nest("/api/auth", auth)
        .nest("/api/user", user)
        .nest("/api/admin", admin)
        .with_state(state)
}

/// Run store or Argon2 work on the blocking pool; both hold locks while touching disk or CPU.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("join_error".to_string(), e.to_string()))?
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Start the HTTP server described by `config`.
pub async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "Agri-Cult starting: http_port={}, data_dir={:?}, environment={:?}, access_ttl_min={}, refresh_ttl_days={}",
        config.http_port,
        config.data_dir,
        config.environment,
        config.auth.access_ttl.num_minutes(),
        config.auth.refresh_ttl.num_days()
    );

    let users = UserStore::open(&config.data_dir)
        .with_context(|| format!("While opening user store under {:?}", config.data_dir))?;
    let state = AppState::new(&config.auth, users);

    // Background sweep of expired OTP codes
    {
        let otps = state.otps.clone();
        tokio::spawn(async move {
            loop {
                let removed = otps.sweep();
                if removed > 0 { tracing::debug!(removed = removed, "otp_sweep"); }
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            }
        });
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_store_writes_do_not_run_on_the_async_worker() {
        let dir = tempfile::tempdir().unwrap();
        let users = UserStore::open(dir.path()).unwrap();
        let worker = std::thread::current().id();
        let (store, phone) = (users.clone(), "9876543210");
        let ran_on = blocking(move || {
            store.get_or_create(phone, crate::identity::Role::User)?;
            Ok(std::thread::current().id())
        })
        .await
        .unwrap();
        assert_ne!(ran_on, worker);
        assert!(UserStore::open(dir.path()).unwrap().get(phone).is_some());

        let err = blocking(|| Err::<(), _>(AppError::not_found("user_not_found", "gone"))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
