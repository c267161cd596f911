//! Per-chunk replica probing.

use bytes::Bytes;
use tracing::debug;
use trawl_placement::CandidateServer;
use trawl_transport::{ops, ServerPool, TransferControl, TransportError};
use trawl_types::{Chunk, ChunkHealth, FileManifest, ServerId};

/// Outcome of probing every recorded replica of one chunk.
///
/// An unreachable server does not condemn its replica: only a payload
/// that downloads and fails the hash check counts as corrupt.
#[derive(Debug)]
pub struct ChunkProbe {
    /// Servers whose replica downloaded and hash-verified.
    pub healthy: Vec<ServerId>,
    /// Servers whose replica downloaded with a wrong hash.
    pub corrupt: Vec<ServerId>,
    /// Servers that could not be reached or did not have the file.
    pub unreachable: Vec<ServerId>,
    /// Locations naming servers absent from the configuration.
    pub unknown_servers: Vec<ServerId>,
    /// Payload of the first healthy replica, kept for refill.
    pub payload: Option<Bytes>,
    /// Classification against the manifest's replication factor.
    pub health: ChunkHealth,
}

/// Probe every recorded replica of `chunk`.
pub async fn probe_chunk(
    pool: &ServerPool,
    chunk: &Chunk,
    replication_factor: u32,
) -> ChunkProbe {
    let mut probe = ChunkProbe {
        healthy: Vec::new(),
        corrupt: Vec::new(),
        unreachable: Vec::new(),
        unknown_servers: Vec::new(),
        payload: None,
        health: ChunkHealth::Lost,
    };

    for location in &chunk.locations {
        if pool.slot(&location.server_id).is_err() {
            probe.unknown_servers.push(location.server_id.clone());
            continue;
        }
        match ops::download_chunk(
            pool,
            &location.server_id,
            &location.remote_path,
            &chunk.hash,
            &TransferControl::none(),
        )
        .await
        {
            Ok(payload) => {
                if probe.payload.is_none() {
                    probe.payload = Some(payload);
                }
                probe.healthy.push(location.server_id.clone());
            }
            Err(TransportError::Integrity { .. }) => {
                debug!(
                    chunk = %chunk.id,
                    server = %location.server_id,
                    "replica failed hash verification"
                );
                probe.corrupt.push(location.server_id.clone());
            }
            Err(e) => {
                debug!(
                    chunk = %chunk.id,
                    server = %location.server_id,
                    error = %e,
                    "replica unreachable"
                );
                probe.unreachable.push(location.server_id.clone());
            }
        }
    }

    probe.health = ChunkHealth::classify(probe.healthy.len(), replication_factor);
    probe
}

/// Build placement candidates from pool health and the manifest's
/// current per-server load.
pub fn placement_candidates(pool: &ServerPool, manifest: &FileManifest) -> Vec<CandidateServer> {
    pool.slots()
        .iter()
        .map(|slot| {
            let health = slot.health();
            CandidateServer {
                id: slot.descriptor().id.clone(),
                usable: health.is_usable(),
                file_load: trawl_placement::file_load(manifest, &slot.descriptor().id),
                latency_ms: health.last_latency_ms,
                priority: slot.descriptor().priority,
            }
        })
        .collect()
}
