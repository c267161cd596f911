//! The per-server primitive surface.

use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;
use crate::progress::TransferControl;

/// Byte-stream primitives against one server.
///
/// Paths are relative to the server's configured base path. Every call
/// blocks the task until completion, timeout, or cancellation; within
/// one store, calls are serialized by the implementation.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store `data` at `path`, replacing any existing file.
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        ctl: &TransferControl,
    ) -> Result<(), TransportError>;

    /// Fetch the contents of `path`.
    async fn download(&self, path: &str, ctl: &TransferControl) -> Result<Bytes, TransportError>;

    /// Remove the file at `path`.
    async fn delete(&self, path: &str) -> Result<(), TransportError>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, TransportError>;

    /// Size in bytes of the file at `path`.
    async fn size(&self, path: &str) -> Result<u64, TransportError>;

    /// Create the directory `path`; succeeds if it already exists.
    async fn mkdir(&self, path: &str) -> Result<(), TransportError>;

    /// File names (not full paths) inside the directory `path`.
    async fn list(&self, path: &str) -> Result<Vec<String>, TransportError>;

    /// Rename `from` to `to` on the server.
    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError>;

    /// Probe the server, returning the round-trip latency.
    async fn ping(&self) -> Result<Duration, TransportError>;
}
