//! Client-side session state: the in-memory access token and identity snapshot.
//!
//! All mutation goes through `login`, `set_access_token`, `refresh` and `logout` (plus
//! `clear_local` for terminal failures), so every write site is easy to audit. Writes are
//! last-write-wins. Concurrent refreshes share one in-flight future, and a refresh that
//! started before a login/logout never overwrites the newer session.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::storage::{DurableStore, LOGGED_IN_KEY, USER_KEY};
use super::transport::{AuthTransport, TokenBody};
use crate::error::{AppError, AppResult};
use crate::identity::Identity;

/// A read-only copy of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub user: Option<Identity>,
    pub is_logged_in: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<String>,
    user: Option<Identity>,
    /// Bumped by login and logout; a refresh only lands in the epoch it started in.
    epoch: u64,
}

struct SessionCore {
    state: RwLock<SessionState>,
    storage: Arc<dyn DurableStore>,
}

impl SessionCore {
    fn mirror(&self, user: Option<&Identity>) {
        match user {
            Some(u) => {
                self.storage.set(LOGGED_IN_KEY, "true");
                match serde_json::to_string(u) {
                    Ok(json) => self.storage.set(USER_KEY, &json),
                    Err(e) => warn!(target: "session", "user snapshot not stored: {e}"),
                }
            }
            None => {
                self.storage.remove(LOGGED_IN_KEY);
                self.storage.remove(USER_KEY);
            }
        }
    }

    fn stored_user(&self) -> Option<Identity> {
        self.storage.get(USER_KEY).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    fn apply_refresh(&self, started_in: u64, body: &TokenBody) {
        let mut state = self.state.write();
        if state.epoch != started_in {
            debug!(target: "session", "discarding refresh result from a previous session");
            return;
        }
        state.access_token = Some(body.access_token.clone());
        if let Some(user) = &body.user {
            state.user = Some(user.clone());
        } else if state.user.is_none() {
            state.user = self.stored_user();
        }
        let user = state.user.clone();
        drop(state);
        if user.is_some() {
            self.mirror(user.as_ref());
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, AppResult<String>>>;

/// Error code for a refresh whose session was replaced while it ran.
pub const SESSION_CHANGED: &str = "session_changed";

/// The in-flight refresh and the epoch it belongs to.
struct Inflight {
    epoch: u64,
    fut: SharedRefresh,
}

#[derive(Clone)]
pub struct SessionClient {
    core: Arc<SessionCore>,
    transport: Arc<dyn AuthTransport>,
    inflight: Arc<Mutex<Option<Inflight>>>,
}

impl SessionClient {
    pub fn new(transport: Arc<dyn AuthTransport>, storage: Arc<dyn DurableStore>) -> Self {
        Self {
            core: Arc::new(SessionCore { state: RwLock::new(SessionState::default()), storage }),
            transport,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn transport(&self) -> &Arc<dyn AuthTransport> { &self.transport }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.core.state.read();
        SessionSnapshot {
            access_token: state.access_token.clone(),
            user: state.user.clone(),
            is_logged_in: state.user.is_some(),
        }
    }

    pub fn access_token(&self) -> Option<String> { self.core.state.read().access_token.clone() }

    pub fn user(&self) -> Option<Identity> { self.core.state.read().user.clone() }

    /// The durable "logged in" flag. A hint for first paint, not proof of a session.
    pub fn has_session_hint(&self) -> bool {
        self.core.storage.get(LOGGED_IN_KEY).as_deref() == Some("true")
    }

    /// The durable user snapshot, if any.
    pub fn stored_user(&self) -> Option<Identity> { self.core.stored_user() }

    pub fn login(&self, access_token: impl Into<String>, user: Identity) {
        {
            let mut state = self.core.state.write();
            state.access_token = Some(access_token.into());
            state.user = Some(user.clone());
            state.epoch += 1;
        }
        self.inflight.lock().take();
        self.core.mirror(Some(&user));
        debug!(target: "session", subject = %user.phone, "login");
    }

    pub fn set_access_token(&self, access_token: impl Into<String>) {
        self.core.state.write().access_token = Some(access_token.into());
    }

    /// Replace the identity snapshot, e.g. after a profile save.
    pub fn set_user(&self, user: Identity) {
        self.core.state.write().user = Some(user.clone());
        self.core.mirror(Some(&user));
    }

    /// Drop the in-memory session and its durable mirror without contacting the server.
    pub fn clear_local(&self) {
        {
            let mut state = self.core.state.write();
            state.access_token = None;
            state.user = None;
            state.epoch += 1;
        }
        self.inflight.lock().take();
        self.core.mirror(None);
    }

    /// Log out locally first, then tell the server to clear the refresh cookie.
    /// A failed notification is logged and otherwise ignored.
    pub async fn logout(&self) {
        self.clear_local();
        if let Err(e) = self.transport.logout().await {
            warn!(target: "session", code = e.code_str(), "server logout failed; local session already cleared");
        }
    }

    /// Exchange the refresh cookie for a new access token.
    ///
    /// Callers that arrive while a refresh is running in the same session await the same
    /// request. If the session is replaced (login, logout) before the refresh lands, the
    /// token is withheld and the caller gets `InvalidSession` with code [`SESSION_CHANGED`].
    pub async fn refresh(&self) -> AppResult<String> {
        let (epoch, fut) = {
            let mut slot = self.inflight.lock();
            let epoch = self.core.state.read().epoch;
            match slot.as_ref() {
                Some(f) if f.epoch == epoch => (epoch, f.fut.clone()),
                _ => {
                    let fut = refresh_once(self.core.clone(), self.transport.clone(), epoch).boxed().shared();
                    *slot = Some(Inflight { epoch, fut: fut.clone() });
                    (epoch, fut)
                }
            }
        };
        let result = fut.clone().await;
        {
            let mut slot = self.inflight.lock();
            if slot.as_ref().map(|f| f.fut.ptr_eq(&fut)).unwrap_or(false) {
                *slot = None;
            }
        }
        let token = result?;
        if self.core.state.read().epoch != epoch {
            return Err(AppError::invalid_session(SESSION_CHANGED, "session replaced during refresh"));
        }
        Ok(token)
    }
}

async fn refresh_once(core: Arc<SessionCore>, transport: Arc<dyn AuthTransport>, started_in: u64) -> AppResult<String> {
    let body = transport.refresh().await?;
    core.apply_refresh(started_in, &body);
    Ok(body.access_token)
}
