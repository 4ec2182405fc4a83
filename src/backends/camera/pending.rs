// SPDX-License-Identifier: GPL-3.0-only

//! Single-resume bridge from hardware callbacks to async code
//!
//! A [`PendingOperation`] is awaited by the caller; the matching
//! [`Completer`] is captured by the hardware callback. The first
//! `resolve` wins. Every later delivery (an error arriving after a
//! disconnect, a callback racing a cancellation) is logged and dropped.

use crate::errors::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct Shared<T> {
    label: &'static str,
    resolved: AtomicBool,
    swallowed: AtomicUsize,
    sender: Mutex<Option<oneshot::Sender<CaptureResult<T>>>>,
}

/// Resolving half, cloned into every callback that may complete the operation
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Awaiting half of an in-flight device or session operation
pub struct PendingOperation<T> {
    label: &'static str,
    receiver: oneshot::Receiver<CaptureResult<T>>,
}

/// Create a linked pending operation and its completer
pub fn pending<T>(label: &'static str) -> (PendingOperation<T>, Completer<T>) {
    let (sender, receiver) = oneshot::channel();
    let shared = Arc::new(Shared {
        label,
        resolved: AtomicBool::new(false),
        swallowed: AtomicUsize::new(0),
        sender: Mutex::new(Some(sender)),
    });
    (
        PendingOperation { label, receiver },
        Completer { shared },
    )
}

impl<T> Completer<T> {
    /// Deliver the outcome
    ///
    /// Hands the outcome back as `Err` when it was not delivered: either an
    /// earlier delivery already resumed the operation or the waiter has gone
    /// away. The caller can then release anything the outcome owns.
    pub fn resolve(&self, outcome: CaptureResult<T>) -> Result<(), CaptureResult<T>> {
        if self.shared.resolved.swap(true, Ordering::AcqRel) {
            self.shared.swallowed.fetch_add(1, Ordering::Relaxed);
            warn!(
                operation = self.shared.label,
                "Swallowing completion because the operation already resumed"
            );
            return Err(outcome);
        }

        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => sender.send(outcome),
            None => Err(outcome),
        }
    }

    /// Number of deliveries dropped after the first
    pub fn swallowed(&self) -> usize {
        self.shared.swallowed.load(Ordering::Relaxed)
    }

    pub fn label(&self) -> &'static str {
        self.shared.label
    }
}

impl<T> PendingOperation<T> {
    /// Wait for the single completion
    ///
    /// A completer dropped without resolving counts as cancellation, so a
    /// waiting party is never left hanging.
    pub async fn wait(self) -> CaptureResult<T> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(operation = self.label, "Completer dropped without resolving");
                Err(CaptureError::Cancelled)
            }
        }
    }
}

/// Type-erased view of an in-flight completer, used for cancellation
pub trait Cancellable: Send + Sync {
    /// Fail the operation with `Cancelled`; `false` if it already resumed
    fn cancel(&self) -> bool;
    fn label(&self) -> &'static str;
}

impl<T: Send + 'static> Cancellable for Completer<T> {
    fn cancel(&self) -> bool {
        self.resolve(Err(CaptureError::Cancelled)).is_ok()
    }

    fn label(&self) -> &'static str {
        self.shared.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::DeviceErrorCode;
    use crate::errors::OpenFailure;

    fn open_error(cause: OpenFailure) -> CaptureError {
        CaptureError::DeviceOpen {
            device: crate::backends::camera::types::DeviceId::new("0"),
            cause,
        }
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let (op, completer) = pending::<u32>("open");
        let other = completer.clone();

        assert!(completer.resolve(Err(open_error(OpenFailure::Disconnected))).is_ok());
        assert!(
            other
                .resolve(Err(open_error(OpenFailure::Error(
                    DeviceErrorCode::CameraDevice
                ))))
                .is_err()
        );

        assert_eq!(completer.swallowed(), 1);
        assert_eq!(
            op.wait().await,
            Err(open_error(OpenFailure::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_late_value_is_handed_back() {
        let (op, completer) = pending::<String>("configure");
        completer.resolve(Ok("first".into())).unwrap();
        let rejected = completer.resolve(Ok("second".into()));
        assert_eq!(rejected, Err(Ok("second".to_string())));
        assert_eq!(op.wait().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_cancel_fails_waiter() {
        let (op, completer) = pending::<()>("capture");
        let cancellable: Arc<dyn Cancellable> = Arc::new(completer.clone());
        assert!(cancellable.cancel());
        assert!(!cancellable.cancel());
        assert_eq!(op.wait().await, Err(CaptureError::Cancelled));
        // A hardware callback arriving after cancellation is swallowed
        assert!(completer.resolve(Ok(())).is_err());
    }

    #[tokio::test]
    async fn test_dropped_completer_is_cancellation() {
        let (op, completer) = pending::<()>("open");
        drop(completer);
        assert_eq!(op.wait().await, Err(CaptureError::Cancelled));
    }

    #[test]
    fn test_value_returned_when_waiter_gone() {
        let (op, completer) = pending::<u8>("capture");
        drop(op);
        assert_eq!(completer.resolve(Ok(7)), Err(Ok(7)));
        assert_eq!(completer.swallowed(), 0);
    }
}
