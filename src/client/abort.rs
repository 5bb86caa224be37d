//! Cancellation tied to the lifetime of whatever owns the controller.

use tokio::sync::watch;

/// Owner side. Aborts on [`AbortController::abort`] or when dropped.
pub struct AbortController {
    tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal { AbortSignal { rx: self.tx.subscribe() } }

    pub fn abort(&self) { self.tx.send_replace(true); }
}

impl Default for AbortController {
    fn default() -> Self { Self::new() }
}

impl Drop for AbortController {
    fn drop(&mut self) { self.tx.send_replace(true); }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool { *self.rx.borrow() }

    /// Resolves once the controller aborts or goes away.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
