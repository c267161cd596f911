//! Error type for orchestrated operations.

use trawl_cas::CasError;
use trawl_manifest::ManifestError;
use trawl_repair::RepairError;
use trawl_transport::TransportError;

/// Errors surfaced by whole-file operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No replica of some chunk could be stored.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// No replica of some chunk could be fetched and verified.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Fewer usable servers than the operation requires.
    #[error("insufficient servers: need {needed}, have {available}")]
    InsufficientServers {
        /// Servers the operation needs.
        needed: usize,
        /// Usable servers found.
        available: usize,
    },

    /// The operation was cancelled from a progress callback.
    #[error("operation cancelled")]
    Cancelled,

    /// Chunking or hashing the local file failed.
    #[error(transparent)]
    Cas(#[from] CasError),

    /// A manifest could not be parsed, validated, or persisted.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A transport primitive failed beyond its retry budget.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A verify/repair pass failed.
    #[error(transparent)]
    Repair(#[from] RepairError),

    /// Local file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
