//! Operation-level progress reporting.

/// A progress update for a long-running operation.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// Human-readable phase, e.g. `"Uploading chunks"`.
    pub operation: &'a str,
    /// Units completed (usually chunks).
    pub current: u64,
    /// Total units, when known.
    pub total: u64,
    /// Payload bytes processed so far.
    pub bytes_processed: u64,
    /// Total payload bytes, when known.
    pub bytes_total: u64,
}

/// Receiver for progress updates.
///
/// Runs on the worker driving the operation; implementations must be
/// cheap and reentrant. Returning `false` requests cancellation, which
/// is honored cooperatively at the next boundary.
pub trait ProgressSink: Send + Sync {
    /// Handle one update; return `false` to cancel the operation.
    fn report(&self, event: &ProgressEvent<'_>) -> bool;
}

/// Sink that discards updates and never cancels.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _event: &ProgressEvent<'_>) -> bool {
        true
    }
}
