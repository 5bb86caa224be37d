//! End-to-end session tests: a real server on an ephemeral port driven through the
//! reqwest transport, the retrying client and raw HTTP calls.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

use agricult::client::{
    ApiClient, ApiRequest, AuthTransport, BootPhase, DurableStore, FileStore, HttpTransport, MemoryStore, SessionBoot,
    SessionClient, LOGGED_IN_KEY,
};
use agricult::config::AuthConfig;
use agricult::error::AppError;
use agricult::identity::{Identity, Role, UserStore};
use agricult::server::{self, AppState};

const ADMIN_PHONE: &str = "9000000001";

struct TestServer {
    base: String,
    state: AppState,
    _dir: TempDir,
}

async fn start_server() -> Result<TestServer> {
    let dir = tempdir()?;
    let mut cfg = AuthConfig::with_secrets("test-access-secret", "test-refresh-secret");
    cfg.expose_dev_otp = true;
    cfg.admin_phones = vec![ADMIN_PHONE.to_string()];
    let users = UserStore::open(dir.path())?;
    let state = AppState::new(&cfg, users);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let serving = state.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, serving).await {
            eprintln!("test server stopped: {e}");
        }
    });
    Ok(TestServer { base: format!("http://{addr}"), state, _dir: dir })
}

async fn login(base: &str, phone: &str) -> Result<(HttpTransport, String, Identity)> {
    let transport = HttpTransport::new(base)?;
    let code = transport.request_otp(phone).await?.expect("dev otp echoed");
    let (token, user) = transport.verify_otp(phone, &code).await?;
    Ok((transport, token, user))
}

fn client_for(transport: HttpTransport) -> ApiClient {
    ApiClient::new(SessionClient::new(Arc::new(transport), Arc::new(MemoryStore::new())))
}

fn expired_token(srv: &TestServer, user: &Identity) -> String {
    srv.state
        .issuer
        .issue_access_token_at(user, chrono::Utc::now() - chrono::Duration::hours(1))
        .unwrap()
}

async fn raw_get(base: &str, path: &str, bearer: Option<&str>) -> Result<(u16, Value)> {
    let mut rb = reqwest::Client::new().get(format!("{base}{path}"));
    if let Some(t) = bearer {
        rb = rb.bearer_auth(t);
    }
    let resp = rb.send().await?;
    let status = resp.status().as_u16();
    Ok((status, resp.json().await?))
}

#[tokio::test]
async fn otp_login_then_profile_roundtrip() -> Result<()> {
    let srv = start_server().await?;
    let (transport, token, user) = login(&srv.base, "98765 43210").await?;
    assert_eq!(user.phone, "9876543210");
    assert_eq!(user.role, Role::User);
    assert!(!user.is_profile_complete());

    let api = client_for(transport);
    api.session().login(token, user);
    let me: Identity = api.get_json("/api/user/profile").await?;
    assert_eq!(me.phone, "9876543210");

    let saved: Identity = api.put_json("/api/user/profile", json!({ "name": "Asha", "address": "Survey 12, Satara" })).await?;
    assert!(saved.is_profile_complete());
    api.session().set_user(saved.clone());
    assert_eq!(srv.state.users.get("9876543210"), Some(saved));
    Ok(())
}

#[tokio::test]
async fn missing_token_is_401_and_stale_token_is_403() -> Result<()> {
    let srv = start_server().await?;
    let (_, _, user) = login(&srv.base, "9876543210").await?;

    let (status, body) = raw_get(&srv.base, "/api/user/profile", None).await?;
    assert_eq!(status, 401);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["type"], "unauthenticated");

    let (status, body) = raw_get(&srv.base, "/api/user/profile", Some("not-a-jwt")).await?;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["type"], "forbidden");

    let (status, body) = raw_get(&srv.base, "/api/user/profile", Some(&expired_token(&srv, &user))).await?;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "token_expired");
    Ok(())
}

#[tokio::test]
async fn stale_token_is_refreshed_transparently() -> Result<()> {
    let srv = start_server().await?;
    let (transport, _, user) = login(&srv.base, "9876543210").await?;
    let stale = expired_token(&srv, &user);

    let api = client_for(transport);
    api.session().login(stale.clone(), user);
    let me: Identity = api.get_json("/api/user/profile").await?;
    assert_eq!(me.phone, "9876543210");
    let fresh = api.session().access_token().expect("token after refresh");
    assert_ne!(fresh, stale);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_returns_identity() -> Result<()> {
    let srv = start_server().await?;
    let (transport, _, _) = login(&srv.base, "9876543210").await?;

    let first = transport.refresh().await?;
    let second = transport.refresh().await?;
    assert_eq!(first.user.map(|u| u.phone).as_deref(), Some("9876543210"));
    assert!(second.user.is_some());
    assert!(srv.state.issuer.verify_access(&second.access_token).is_ok());
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent() -> Result<()> {
    let srv = start_server().await?;
    let (transport, token, user) = login(&srv.base, "9876543210").await?;
    transport.logout().await?;
    transport.logout().await?;

    let fresh = HttpTransport::new(&srv.base)?;
    fresh.logout().await?;

    let api = client_for(transport);
    api.session().login(token, user);
    api.session().logout().await;
    assert!(!api.session().snapshot().is_logged_in);
    Ok(())
}

#[tokio::test]
async fn refresh_fails_after_logout() -> Result<()> {
    let srv = start_server().await?;
    let (transport, _, user) = login(&srv.base, "9876543210").await?;
    transport.refresh().await?;

    transport.logout().await?;
    let err = transport.refresh().await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }), "got {err:?}");

    let cookie = srv.state.issuer.issue_refresh_token(&user).unwrap();
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/logout", srv.base))
        .header(reqwest::header::COOKIE, format!("agricult_refresh={cookie}"))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let set_cookie = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(set_cookie.starts_with("agricult_refresh=;"), "{set_cookie}");
    assert!(set_cookie.contains("Max-Age=0"), "{set_cookie}");
    assert!(set_cookie.contains("Path=/api/auth"), "{set_cookie}");
    Ok(())
}

#[tokio::test]
async fn session_without_refresh_cookie_ends_terminally() -> Result<()> {
    let srv = start_server().await?;
    let (_, _, user) = login(&srv.base, "9876543210").await?;

    // Another browser: holds a stale access token but never received the cookie.
    let api = client_for(HttpTransport::new(&srv.base)?);
    api.session().login(expired_token(&srv, &user), user);

    let err = api.send(ApiRequest::get("/api/user/profile")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSession { .. }), "got {err:?}");
    assert!(!api.session().snapshot().is_logged_in);
    assert_eq!(api.session().access_token(), None);
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_admin_role() -> Result<()> {
    let srv = start_server().await?;
    let (_, user_token, _) = login(&srv.base, "9876543210").await?;
    let (admin_transport, admin_token, admin) = login(&srv.base, ADMIN_PHONE).await?;
    assert_eq!(admin.role, Role::Admin);

    let (status, body) = raw_get(&srv.base, "/api/admin/users", Some(&user_token)).await?;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["type"], "access_denied");

    let (status, body) = raw_get(&srv.base, "/api/admin/users", Some(&admin_token)).await?;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().map(|a| a.len()), Some(2));

    let api = client_for(admin_transport);
    api.session().login(admin_token, admin);
    let resp = api.delete("/api/admin/users/9876543210").await?;
    assert_eq!(resp.body["deleted"], "9876543210");
    let err = api.delete("/api/admin/users/9876543210").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn deleted_account_cannot_refresh() -> Result<()> {
    let srv = start_server().await?;
    let (transport, token, user) = login(&srv.base, "9876543210").await?;
    let cookie = srv.state.issuer.issue_refresh_token(&user).unwrap();

    let api = client_for(transport);
    api.session().login(token, user);
    api.delete("/api/user/profile").await?;
    assert!(srv.state.users.get("9876543210").is_none());

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/refresh", srv.base))
        .header(reqwest::header::COOKIE, format!("agricult_refresh={cookie}"))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["type"], "invalid_session");
    assert_eq!(body["error"]["code"], "unknown_subject");
    Ok(())
}

#[tokio::test]
async fn boot_restores_session_from_durable_hint() -> Result<()> {
    let srv = start_server().await?;
    let (transport, _, _) = login(&srv.base, "9876543210").await?;

    let dir = tempdir()?;
    let storage = Arc::new(FileStore::open(dir.path().join("storage.json"))?);
    storage.set(LOGGED_IN_KEY, "true");
    let session = SessionClient::new(Arc::new(transport), storage);

    let boot = SessionBoot::new();
    assert_eq!(boot.run(&session).await, BootPhase::Ready);
    assert!(session.access_token().is_some());
    assert_eq!(session.user().map(|u| u.phone).as_deref(), Some("9876543210"));
    Ok(())
}
