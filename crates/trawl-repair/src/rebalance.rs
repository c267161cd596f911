//! Replica rebalancing across servers.
//!
//! Targets an even per-server replica count for one file:
//! `floor(total / servers)`, with the remainder spread over the
//! lower-index servers in configuration order. Moves are greedy and
//! repair-preserving: a replica is copied to the sink first and removed
//! from the source only when the chunk would still hold at least its
//! replication factor afterwards.

use tracing::{debug, warn};
use trawl_transport::{ops, ServerPool, TransferControl};
use trawl_types::{FileManifest, MAX_CHUNK_LOCATIONS};

use crate::error::RepairError;

/// Rebalance one manifest in place. Returns the number of moves.
pub async fn rebalance_manifest(
    pool: &ServerPool,
    manifest: &mut FileManifest,
) -> Result<usize, RepairError> {
    let server_ids = pool.server_ids();
    let server_count = server_ids.len();
    if server_count == 0 {
        return Ok(0);
    }

    let mut per_server: Vec<usize> = server_ids
        .iter()
        .map(|id| trawl_placement::file_load(manifest, id))
        .collect();
    let total: usize = per_server.iter().sum();
    if total == 0 {
        return Ok(0);
    }

    let average = total / server_count;
    let remainder = total % server_count;
    let target = |index: usize| average + usize::from(index < remainder);
    let factor = manifest.replication_factor as usize;

    let mut moves = 0usize;

    for from in 0..server_count {
        while per_server[from] > target(from) {
            let Some(to) = (0..server_count).find(|&s| per_server[s] < target(s)) else {
                return Ok(moves);
            };

            let mut moved = false;
            for index in 0..manifest.chunks.len() {
                let chunk = &manifest.chunks[index];
                let from_id = &server_ids[from];
                let to_id = &server_ids[to];
                if !chunk.has_location(from_id)
                    || chunk.has_location(to_id)
                    || chunk.locations.len() >= MAX_CHUNK_LOCATIONS
                {
                    continue;
                }

                // A move needs verified payload bytes; prefer the source
                // replica, fall back to any other recorded one.
                let mut payload = None;
                let location_order: Vec<_> = chunk
                    .locations
                    .iter()
                    .filter(|l| pool.slot(&l.server_id).is_ok())
                    .cloned()
                    .collect();
                for location in location_order
                    .iter()
                    .filter(|l| &l.server_id == from_id)
                    .chain(location_order.iter().filter(|l| &l.server_id != from_id))
                {
                    match ops::download_chunk(
                        pool,
                        &location.server_id,
                        &location.remote_path,
                        &chunk.hash,
                        &TransferControl::none(),
                    )
                    .await
                    {
                        Ok(data) => {
                            payload = Some(data);
                            break;
                        }
                        Err(e) => {
                            debug!(chunk = %chunk.id, server = %location.server_id, error = %e,
                                "replica unavailable for rebalance");
                        }
                    }
                }
                let Some(payload) = payload else { continue };

                match ops::upload_chunk(
                    pool,
                    to_id,
                    &chunk.id,
                    payload,
                    &TransferControl::none(),
                )
                .await
                {
                    Ok(path) => {
                        let mut chunk = manifest.chunks[index].clone();
                        chunk.add_location(to_id.clone(), path);

                        // Remove from the source only when the chunk
                        // keeps >= factor replicas without it.
                        if chunk.locations.len() > factor {
                            if let Some(location) = chunk.location_on(from_id) {
                                let path = location.remote_path.clone();
                                if let Err(e) = ops::delete_chunk(pool, from_id, &path).await {
                                    warn!(chunk = %chunk.id, server = %from_id, error = %e,
                                        "failed to delete source replica after move");
                                }
                            }
                            chunk.remove_location(from_id);
                            per_server[from] -= 1;
                        }

                        manifest.chunks[index] = chunk;
                        per_server[to] += 1;
                        moves += 1;
                        moved = true;
                        break;
                    }
                    Err(e) => {
                        warn!(chunk = %chunk.id, server = %to_id, error = %e,
                            "rebalance upload failed");
                    }
                }
            }

            if !moved {
                break;
            }
        }
    }

    Ok(moves)
}
