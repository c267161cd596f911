//! The trawl orchestrator.
//!
//! [`TrawlEngine`] drives whole-file operations over the chunker, the
//! placement policy, the transport pool, and the manifest codec:
//! upload with per-chunk replica fan-out, download with per-replica
//! failover and hash verification, delete, listing, verify/repair, and
//! server health checks. A [`HealthMonitor`] can run probe rounds in
//! the background at a configured cadence.

mod engine;
mod error;
mod monitor;
mod progress;

#[cfg(test)]
mod tests;

pub use engine::{EngineConfig, TrawlEngine};
pub use error::EngineError;
pub use monitor::HealthMonitor;
pub use progress::{NullProgress, ProgressEvent, ProgressSink};
