//! Transport error taxonomy and retry classification.

use trawl_types::{ServerId, Sha256Digest};

/// Errors produced by transport primitives.
///
/// Classification happens at the primitive boundary: [`is_retryable`]
/// decides whether the pool's bounded retry loop may try again, and
/// [`poisons_session`] whether the cached FTP session must be torn down
/// and reopened on the next acquire.
///
/// [`is_retryable`]: TransportError::is_retryable
/// [`poisons_session`]: TransportError::poisons_session
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection-level failure: refused, reset, resolution, TLS.
    #[error("network error: {0}")]
    Network(String),

    /// The operation exceeded its wall-clock budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The server rejected the operation at the protocol level.
    #[error("ftp error: {0}")]
    Ftp(String),

    /// Login was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The remote path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server denied access to the path.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The server reports exhausted storage.
    #[error("storage full: {0}")]
    StorageFull(String),

    /// Downloaded bytes do not hash to the expected digest.
    #[error("integrity mismatch for {path}: expected {expected}, got {actual}")]
    Integrity {
        /// Remote path of the offending replica.
        path: String,
        /// Digest recorded in the manifest.
        expected: Sha256Digest,
        /// Digest of the bytes actually received.
        actual: Sha256Digest,
    },

    /// A progress callback requested cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// The id does not name a configured server.
    #[error("unknown server: {0}")]
    UnknownServer(ServerId),

    /// Local I/O failed while staging a transfer.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the bounded retry loop may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout(_))
    }

    /// Whether the cached session is no longer trustworthy.
    pub fn poisons_session(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_)
                | TransportError::Timeout(_)
                | TransportError::AuthFailed(_)
                | TransportError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TransportError::Network("refused".into()).is_retryable());
        assert!(TransportError::Timeout("30s".into()).is_retryable());

        assert!(!TransportError::AuthFailed("530".into()).is_retryable());
        assert!(!TransportError::NotFound("x".into()).is_retryable());
        assert!(!TransportError::AccessDenied("x".into()).is_retryable());
        assert!(!TransportError::StorageFull("x".into()).is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
        assert!(!TransportError::Ftp("451".into()).is_retryable());
        assert!(!TransportError::Integrity {
            path: "chunks/x".into(),
            expected: Sha256Digest::from_bytes([0; 32]),
            actual: Sha256Digest::from_bytes([1; 32]),
        }
        .is_retryable());
    }

    #[test]
    fn test_session_poisoning() {
        assert!(TransportError::Network("reset".into()).poisons_session());
        assert!(TransportError::Cancelled.poisons_session());
        assert!(!TransportError::NotFound("x".into()).poisons_session());
        assert!(!TransportError::Ftp("x".into()).poisons_session());
    }
}
