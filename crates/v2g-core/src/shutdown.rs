//! External cancellation signal
//!
//! Process shutdown (or an operator request) raises the flag once;
//! every session holds a [`ShutdownSignal`] and selects on it at its
//! suspension points, sending the dialect-appropriate SessionStop when
//! the dialogue allows one and closing otherwise.

use tokio::sync::watch;

/// Create a linked handle/signal pair.
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// The raising side, held by the process entry point.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Raise the flag. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// The observing side, cloned into every server loop and session.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether the flag is already raised.
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is raised. Pends forever when the handle
    /// went away without raising it.
    pub async fn raised(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Select helper for sessions that may run without a signal wired in:
/// resolves on cancellation, pends forever otherwise.
pub async fn cancelled(signal: &mut Option<ShutdownSignal>) {
    match signal {
        Some(signal) => signal.raised().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_resolves_waiters() {
        let (handle, mut signal) = channel();
        assert!(!signal.is_raised());
        handle.trigger();
        signal.raised().await;
        assert!(signal.is_raised());
    }

    #[tokio::test]
    async fn trigger_before_wait_still_resolves() {
        let (handle, signal) = channel();
        handle.trigger();
        drop(handle);
        let mut cloned = signal.clone();
        cloned.raised().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_does_not_cancel() {
        let (handle, mut signal) = channel();
        drop(handle);
        let raised = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            signal.raised(),
        )
        .await;
        assert!(raised.is_err());
    }
}
