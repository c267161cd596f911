//! Multi-server FTP/FTPS transfer substrate.
//!
//! The transport turns a set of configured servers into uniform
//! byte-stream endpoints:
//!
//! - [`RemoteStore`] is the per-server primitive surface (upload,
//!   download, delete, exists, size, mkdir, list, rename, ping).
//! - [`FtpStore`] implements it over suppaftp, one cached authenticated
//!   session per server, blocking calls isolated on the blocking pool.
//! - [`MemoryStore`] is an in-process implementation with fault and
//!   corruption injection for tests.
//! - [`ServerPool`] serializes operations per server, bounds aggregate
//!   concurrency, wraps every call in the retry policy, and tracks
//!   per-server health and latency.
//! - [`ops`] holds the chunk/manifest layout on the wire and the atomic
//!   upload protocol (`.tmp` + rename).

mod error;
mod ftp;
mod memory;
pub mod ops;
mod pool;
mod progress;
mod traits;
pub mod url;

pub use error::TransportError;
pub use ftp::FtpStore;
pub use memory::MemoryStore;
pub use pool::{PoolOptions, ServerPool, ServerSlot};
pub use progress::TransferControl;
pub use traits::RemoteStore;
