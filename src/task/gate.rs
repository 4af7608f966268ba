//! Cooperative suspension checkpoint
//!
//! Workers consult a [`PauseGate`] and a cancellation token at well-defined
//! checkpoints (before each item fetch). Pausing closes the gate so workers
//! block at their next checkpoint; cancelling opens it again so a paused
//! worker wakes only to observe cancellation, never to keep working.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The synchronization point a worker consults to block/unblock cooperatively
pub(crate) struct PauseGate {
    tx: watch::Sender<bool>,
}

impl PauseGate {
    /// Create an open gate
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    /// Close the gate: workers block at their next checkpoint
    pub(crate) fn close(&self) {
        self.tx.send_replace(false);
    }

    /// Open the gate: blocked workers resume
    pub(crate) fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Wait until the gate is open
    pub(crate) async fn wait_open(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Result of consulting a checkpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Checkpoint {
    /// Proceed with the next item
    Continue,
    /// Cancellation was requested: stop without starting new work
    Cancelled,
}

/// Consult the pause gate and cancellation token.
///
/// Blocks while the gate is closed. Cancellation always wins: `cancel()`
/// opens the gate, so a worker parked here wakes and observes the token.
pub(crate) async fn checkpoint(gate: &PauseGate, cancel: &CancellationToken) -> Checkpoint {
    if cancel.is_cancelled() {
        return Checkpoint::Cancelled;
    }
    gate.wait_open().await;
    if cancel.is_cancelled() {
        return Checkpoint::Cancelled;
    }
    Checkpoint::Continue
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn open_gate_passes_checkpoint_immediately() {
        let gate = PauseGate::new();
        let cancel = CancellationToken::new();
        assert_eq!(checkpoint(&gate, &cancel).await, Checkpoint::Continue);
    }

    #[tokio::test]
    async fn closed_gate_blocks_until_reopened() {
        let gate = std::sync::Arc::new(PauseGate::new());
        let cancel = CancellationToken::new();
        gate.close();

        let blocked = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { checkpoint(&gate, &cancel).await })
        };

        // The checkpoint must still be parked after a short wait
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "worker should block while paused");

        gate.open();
        assert_eq!(blocked.await.unwrap(), Checkpoint::Continue);
    }

    #[tokio::test]
    async fn cancellation_wakes_a_paused_worker_to_observe_it() {
        let gate = std::sync::Arc::new(PauseGate::new());
        let cancel = CancellationToken::new();
        gate.close();

        let blocked = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { checkpoint(&gate, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;

        // Cancel opens the gate: the parked worker must wake into Cancelled,
        // never into Continue
        cancel.cancel();
        gate.open();
        assert_eq!(blocked.await.unwrap(), Checkpoint::Cancelled);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_even_with_open_gate() {
        let gate = PauseGate::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(checkpoint(&gate, &cancel).await, Checkpoint::Cancelled);
    }
}
