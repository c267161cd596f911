//! Error type for chunking and hashing.

use std::path::PathBuf;

/// Errors produced while hashing or chunking local files.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// The input file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// A caller-supplied parameter was unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An I/O error occurred while reading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
