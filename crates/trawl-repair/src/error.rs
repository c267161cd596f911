//! Error type for repair operations.

use trawl_manifest::ManifestError;
use trawl_transport::TransportError;

/// Errors produced by verify/repair/rebalance runs.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// A transport primitive failed beyond its retry budget.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A manifest could not be fetched, parsed, or persisted.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
}
