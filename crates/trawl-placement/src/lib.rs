//! Replica placement policy.
//!
//! Picks target servers for new chunk replicas. The policy, in order:
//!
//! 1. Never place two replicas of one chunk on the same server.
//! 2. Skip servers whose last health probe failed.
//! 3. Prefer servers holding fewer chunks of the same file, breaking
//!    ties by lower recent latency, then configured priority, then
//!    lexicographic server id.
//!
//! Selection is a pure function over candidate snapshots; the
//! orchestrator builds the snapshots from pool health and the manifest
//! and decides what a shortfall means for the running operation.

use std::cmp::Ordering;

use trawl_types::{FileManifest, ServerId};

/// Snapshot of one server as placement input.
#[derive(Debug, Clone)]
pub struct CandidateServer {
    /// Server identity.
    pub id: ServerId,
    /// Whether the last health probe allows use.
    pub usable: bool,
    /// Replicas of the current file already held by this server.
    pub file_load: usize,
    /// Last measured probe latency in milliseconds (0 = unmeasured).
    pub latency_ms: f64,
    /// Configured priority; lower wins ties.
    pub priority: i32,
}

/// Result of a placement decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Chosen servers, best first. May be shorter than requested.
    pub targets: Vec<ServerId>,
    /// How many replicas were asked for.
    pub requested: usize,
}

impl Placement {
    /// How many requested replicas could not be placed.
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.targets.len())
    }

    /// Whether every requested replica found a server.
    pub fn is_complete(&self) -> bool {
        self.shortfall() == 0
    }
}

/// Choose up to `requested` servers for new replicas of one chunk.
///
/// `holders` are servers that already store the chunk and are never
/// chosen again.
pub fn select_targets(
    candidates: &[CandidateServer],
    holders: &[ServerId],
    requested: usize,
) -> Placement {
    let mut eligible: Vec<&CandidateServer> = candidates
        .iter()
        .filter(|c| c.usable)
        .filter(|c| !holders.contains(&c.id))
        .collect();

    eligible.sort_by(|a, b| {
        a.file_load
            .cmp(&b.file_load)
            .then_with(|| {
                a.latency_ms
                    .partial_cmp(&b.latency_ms)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| a.id.cmp(&b.id))
    });

    Placement {
        targets: eligible
            .into_iter()
            .take(requested)
            .map(|c| c.id.clone())
            .collect(),
        requested,
    }
}

/// Count replicas of `manifest`'s chunks held by `server_id`.
///
/// This is the per-file load used by the placement ordering.
pub fn file_load(manifest: &FileManifest, server_id: &ServerId) -> usize {
    manifest
        .chunks
        .iter()
        .filter(|chunk| chunk.has_location(server_id))
        .count()
}
