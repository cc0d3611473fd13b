//! Asynchronous probing bridge
//!
//! One probe cycle may be outstanding at a time. The caller gets a one-shot
//! handle resolved exactly once by the session's receive path when the
//! probe-completion report arrives. There is no implicit timeout; a caller
//! requiring a bounded wait wraps the handle in its own timeout or cancels
//! the pending cycle explicitly.

use motionkit_core::{ControllerError, Position, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Result of a probe cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    /// Whether the probe input triggered before the travel limit
    pub triggered: bool,
    /// The position at trigger (or at the limit)
    pub position: Position,
}

/// Single-resolution handle to a pending probe cycle
#[derive(Debug)]
pub struct ProbeHandle {
    receiver: oneshot::Receiver<ProbeOutcome>,
}

impl ProbeHandle {
    /// Wait for the device to finish the probe cycle
    ///
    /// Returns `ProbeCancelled` if the cycle was cancelled before a result
    /// arrived.
    pub async fn wait(self) -> Result<ProbeOutcome> {
        self.receiver
            .await
            .map_err(|_| ControllerError::ProbeCancelled.into())
    }
}

/// One-shot probe request/result bridge
#[derive(Debug, Default)]
pub struct ProbingService {
    pending: Mutex<Option<oneshot::Sender<ProbeOutcome>>>,
}

impl ProbingService {
    /// Create an idle probing service
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a probe cycle and return its handle
    ///
    /// Rejects synchronously with `ProbeAlreadyPending` while another cycle
    /// is outstanding.
    pub fn begin(&self) -> Result<ProbeHandle> {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(ControllerError::ProbeAlreadyPending.into());
        }
        let (sender, receiver) = oneshot::channel();
        *pending = Some(sender);
        Ok(ProbeHandle { receiver })
    }

    /// Whether a probe cycle is outstanding
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Resolve the pending cycle from the receive path
    ///
    /// A report with no pending cycle is device chatter; it is logged and
    /// dropped.
    pub fn resolve(&self, outcome: ProbeOutcome) {
        match self.pending.lock().take() {
            Some(sender) => {
                // The caller may have dropped its handle; that is not an error.
                let _ = sender.send(outcome);
            }
            None => {
                tracing::warn!("Dropping probe report with no pending cycle: {outcome:?}");
            }
        }
    }

    /// Cancel the pending cycle, if any
    ///
    /// The waiting handle resolves with `ProbeCancelled`.
    pub fn cancel(&self) {
        if self.pending.lock().take().is_some() {
            tracing::debug!("Pending probe cycle cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motionkit_core::Error;

    #[tokio::test]
    async fn test_single_outstanding_probe() {
        let service = ProbingService::new();
        let handle = service.begin().unwrap();

        // Second request while the first is outstanding fails immediately
        match service.begin() {
            Err(Error::Controller(ControllerError::ProbeAlreadyPending)) => {}
            other => panic!("Expected ProbeAlreadyPending, got {other:?}"),
        }

        // The first cycle still resolves normally
        let outcome = ProbeOutcome {
            triggered: true,
            position: Position::linear(10.0, 0.0, 0.0),
        };
        service.resolve(outcome);
        assert_eq!(handle.wait().await.unwrap(), outcome);
        assert!(!service.is_pending());
    }

    #[tokio::test]
    async fn test_cancel_resolves_waiter_with_error() {
        let service = ProbingService::new();
        let handle = service.begin().unwrap();
        service.cancel();

        match handle.wait().await {
            Err(Error::Controller(ControllerError::ProbeCancelled)) => {}
            other => panic!("Expected ProbeCancelled, got {other:?}"),
        }

        // A new cycle may start after cancellation
        assert!(service.begin().is_ok());
    }

    #[test]
    fn test_unsolicited_report_is_dropped() {
        let service = ProbingService::new();
        // Must not panic or create state
        service.resolve(ProbeOutcome {
            triggered: false,
            position: Position::ZERO,
        });
        assert!(!service.is_pending());
    }
}
