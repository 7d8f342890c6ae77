//! Cooperative shutdown signalling.
//!
//! A [`ShutdownTrigger`] flips a shared flag once; every cloned [`Shutdown`]
//! observes it. Loops check [`Shutdown::is_cancelled`] at iteration
//! boundaries and may await [`Shutdown::cancelled`] while idle.

use tokio::sync::watch;

/// Creates a linked trigger/token pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// The sending half; requests shutdown of everything holding a [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Requests shutdown. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new token observing this trigger.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// The observing half; cheap to clone into every worker.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Dropping the sender leaves the flag permanently false.
        drop(tx);
        Self { rx }
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when shutdown is requested; pends forever if it never is.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
