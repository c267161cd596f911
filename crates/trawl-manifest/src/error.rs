//! Error type for manifest handling.

/// Errors produced by the manifest codec and store.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest could not be parsed or violates an invariant.
    #[error("manifest corrupt: {0}")]
    Corrupt(String),

    /// No manifest exists under the requested name.
    #[error("manifest not found: {0}")]
    NotFound(String),

    /// An I/O error occurred while persisting or loading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
