//! Byte-level progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback receiving `(bytes_done, bytes_total)` during a transfer.
pub type ByteProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Shared control handle for one or more transfers.
///
/// Cancellation is level-triggered and cooperative: transfers observe
/// the flag at block boundaries and abort with
/// [`TransportError::Cancelled`](crate::TransportError::Cancelled).
/// Progress callbacks run on the transfer's worker thread and must be
/// cheap and reentrant.
#[derive(Clone, Default)]
pub struct TransferControl {
    cancelled: Arc<AtomicBool>,
    on_bytes: Option<Arc<ByteProgressFn>>,
}

impl TransferControl {
    /// A control with no callback and no way to cancel.
    pub fn none() -> Self {
        Self::default()
    }

    /// Attach a byte-progress callback.
    pub fn with_progress(mut self, f: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.on_bytes = Some(Arc::new(f));
        self
    }

    /// Request cancellation; honored at the next block boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Report transfer progress.
    pub fn report(&self, bytes_done: u64, bytes_total: u64) {
        if let Some(f) = &self.on_bytes {
            f(bytes_done, bytes_total);
        }
    }
}

impl std::fmt::Debug for TransferControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferControl")
            .field("cancelled", &self.is_cancelled())
            .field("has_callback", &self.on_bytes.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_cancel_is_shared_across_clones() {
        let ctl = TransferControl::none();
        let clone = ctl.clone();
        assert!(!clone.is_cancelled());
        ctl.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_progress_callback() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        let ctl = TransferControl::none()
            .with_progress(move |done, _total| seen2.store(done, Ordering::Relaxed));
        ctl.report(42, 100);
        assert_eq!(seen.load(Ordering::Relaxed), 42);
    }
}
