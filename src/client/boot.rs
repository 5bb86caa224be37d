//! First-load session verification.
//!
//! `Initializing → Verifying → Ready`, skipping `Verifying` when the durable hint says
//! nobody was logged in. Guarded views stay on a loading indicator until `Ready`, so no
//! child view fires an authenticated request before a token exists.

use tokio::sync::watch;
use tracing::{debug, info};

use super::session::{SessionClient, SESSION_CHANGED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    Initializing,
    Verifying,
    Ready,
}

pub struct SessionBoot {
    tx: watch::Sender<BootPhase>,
}

impl Default for SessionBoot {
    fn default() -> Self { Self::new() }
}

impl SessionBoot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BootPhase::Initializing);
        Self { tx }
    }

    pub fn phase(&self) -> BootPhase { *self.tx.borrow() }

    pub fn subscribe(&self) -> watch::Receiver<BootPhase> { self.tx.subscribe() }

    /// Verify the session with the server. The server's answer wins over the durable hint.
    pub async fn run(&self, session: &SessionClient) -> BootPhase {
        if self.phase() == BootPhase::Ready {
            return BootPhase::Ready;
        }
        if session.has_session_hint() {
            self.tx.send_replace(BootPhase::Verifying);
            match session.refresh().await {
                Ok(_) => info!(target: "session", "session restored"),
                Err(e) if e.code_str() == SESSION_CHANGED => debug!(target: "session", "login landed during verification"),
                Err(e) => {
                    debug!(target: "session", code = e.code_str(), "stored session rejected by server");
                    session.clear_local();
                }
            }
        }
        self.tx.send_replace(BootPhase::Ready);
        BootPhase::Ready
    }

    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|p| *p == BootPhase::Ready).await;
    }
}
