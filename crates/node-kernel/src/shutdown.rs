//! Process shutdown requests.
//!
//! Lifecycle watchers run inside event dispatch and cannot stop the process
//! themselves. They request shutdown here; the binary waits on the signal and
//! tears the kernel down.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

/// Cloneable shutdown request channel. The first request wins.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// A signal with no request pending.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns `false` if shutdown was already requested.
    pub fn request(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let accepted = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });

        if accepted {
            warn!(reason = %reason, "Shutdown requested");
        }
        accepted
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Reason of the pending request.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Wait until shutdown is requested and return the reason.
    pub async fn wait(&self) -> String {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return "shutdown channel closed".to_string();
            }
        }
    }
}
