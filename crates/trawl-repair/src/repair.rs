//! The repair engine: verify, cleanup, refill.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use trawl_manifest as manifest_codec;
use trawl_transport::{ops, ServerPool, TransferControl};
use trawl_types::{ChunkHealth, FileManifest, RepairStats, ServerId};

use crate::error::RepairError;
use crate::health::{placement_candidates, probe_chunk};

/// What a repair pass is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    /// Probe and classify only; no mutation.
    VerifyOnly,
    /// Remove corrupt replicas and refill missing ones.
    Auto,
    /// Like `Auto`, but also re-upload to servers whose replica looks
    /// healthy. Useful after a server was thought lost.
    Force,
}

/// Store-wide file health summary, one bucket per file, classified by
/// the file's worst chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemHealth {
    /// Files examined.
    pub total_files: u32,
    /// Files whose chunks are all HEALTHY.
    pub healthy_files: u32,
    /// Files with at least one DEGRADED chunk and nothing worse.
    pub degraded_files: u32,
    /// Files with at least one CRITICAL chunk and nothing worse.
    pub critical_files: u32,
    /// Files with at least one LOST chunk.
    pub lost_files: u32,
}

/// Reconciles replica sets against the servers.
pub struct RepairEngine {
    pool: Arc<ServerPool>,
}

impl RepairEngine {
    /// Create a repair engine over the shared pool.
    pub fn new(pool: Arc<ServerPool>) -> Self {
        Self { pool }
    }

    /// Probe one file without mutating anything.
    pub async fn verify_file(&self, remote_name: &str) -> Result<RepairStats, RepairError> {
        self.repair_file(remote_name, RepairMode::VerifyOnly).await
    }

    /// Verify one file and, depending on `mode`, repair it. The manifest
    /// is rewritten to every server when any chunk changed.
    pub async fn repair_file(
        &self,
        remote_name: &str,
        mode: RepairMode,
    ) -> Result<RepairStats, RepairError> {
        let started = Instant::now();
        let mut manifest = self.fetch_manifest(remote_name).await?;

        let (mut stats, mutated) = self.process_manifest(&mut manifest, mode).await;

        if mutated {
            manifest.touch(false, true, true);
            self.write_back(remote_name, &manifest).await?;
        }

        stats.elapsed_seconds = started.elapsed().as_secs_f64();
        info!(
            file = remote_name,
            verified = stats.chunks_verified,
            healthy = stats.chunks_healthy,
            degraded = stats.chunks_degraded,
            critical = stats.chunks_critical,
            lost = stats.chunks_lost,
            repaired = stats.chunks_repaired,
            "repair pass complete"
        );
        Ok(stats)
    }

    /// Run a repair pass over every file in the store.
    pub async fn repair_all(&self, mode: RepairMode) -> Result<RepairStats, RepairError> {
        let started = Instant::now();
        let mut total = RepairStats::default();
        for name in ops::list_manifest_names(&self.pool).await? {
            match self.repair_file(&name, mode).await {
                Ok(stats) => total.merge(&stats),
                Err(e) => warn!(file = %name, error = %e, "skipping file during store-wide repair"),
            }
        }
        total.elapsed_seconds = started.elapsed().as_secs_f64();
        Ok(total)
    }

    /// Classify every file by its worst chunk.
    pub async fn system_health(&self) -> Result<SystemHealth, RepairError> {
        let mut summary = SystemHealth::default();
        for name in ops::list_manifest_names(&self.pool).await? {
            let manifest = match self.fetch_manifest(&name).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(file = %name, error = %e, "cannot analyze file");
                    continue;
                }
            };
            summary.total_files += 1;

            let mut worst = ChunkHealth::Healthy;
            for chunk in &manifest.chunks {
                let probe = probe_chunk(&self.pool, chunk, manifest.replication_factor).await;
                worst = match (worst, probe.health) {
                    (_, ChunkHealth::Lost) | (ChunkHealth::Lost, _) => ChunkHealth::Lost,
                    (_, ChunkHealth::Critical) | (ChunkHealth::Critical, _) => {
                        ChunkHealth::Critical
                    }
                    (_, ChunkHealth::Degraded) | (ChunkHealth::Degraded, _) => {
                        ChunkHealth::Degraded
                    }
                    _ => ChunkHealth::Healthy,
                };
            }
            match worst {
                ChunkHealth::Healthy => summary.healthy_files += 1,
                ChunkHealth::Degraded => summary.degraded_files += 1,
                ChunkHealth::Critical => summary.critical_files += 1,
                ChunkHealth::Lost => summary.lost_files += 1,
            }
        }
        Ok(summary)
    }

    /// Even out one file's per-server replica counts.
    pub async fn rebalance_file(&self, remote_name: &str) -> Result<usize, RepairError> {
        let mut manifest = self.fetch_manifest(remote_name).await?;
        let moves = crate::rebalance::rebalance_manifest(&self.pool, &mut manifest).await?;
        if moves > 0 {
            manifest.touch(false, true, false);
            self.write_back(remote_name, &manifest).await?;
        }
        Ok(moves)
    }

    /// Fetch and validate a manifest from the first responsive server.
    pub async fn fetch_manifest(&self, remote_name: &str) -> Result<FileManifest, RepairError> {
        let (served_by, bytes) = ops::fetch_manifest(&self.pool, remote_name).await?;
        debug!(file = remote_name, server = %served_by, "manifest fetched");
        let json = std::str::from_utf8(&bytes).map_err(|e| {
            RepairError::Manifest(trawl_manifest::ManifestError::Corrupt(e.to_string()))
        })?;
        Ok(manifest_codec::from_json(json)?)
    }

    /// Rewrite the manifest to every server; at least one must take it.
    pub async fn write_back(
        &self,
        remote_name: &str,
        manifest: &FileManifest,
    ) -> Result<(), RepairError> {
        let json = manifest_codec::to_json(manifest)?;
        let mut successes = 0usize;
        let mut last_err = None;
        for server_id in self.pool.server_ids() {
            match ops::upload_manifest(&self.pool, &server_id, remote_name, &json).await {
                Ok(()) => successes += 1,
                Err(e) => {
                    warn!(file = remote_name, server = %server_id, error = %e, "manifest write-back failed");
                    last_err = Some(e);
                }
            }
        }
        match (successes, last_err) {
            (0, Some(e)) => Err(RepairError::Transport(e)),
            _ => Ok(()),
        }
    }

    /// Probe and mend every chunk. Returns the pass statistics and
    /// whether the manifest changed.
    async fn process_manifest(
        &self,
        manifest: &mut FileManifest,
        mode: RepairMode,
    ) -> (RepairStats, bool) {
        let mut stats = RepairStats::default();
        let mut mutated = false;
        let target = manifest.replication_factor;

        for index in 0..manifest.chunks.len() {
            let mut chunk = manifest.chunks[index].clone();
            stats.chunks_verified += 1;

            let probe = probe_chunk(&self.pool, &chunk, target).await;
            match probe.health {
                ChunkHealth::Healthy => stats.chunks_healthy += 1,
                ChunkHealth::Degraded => stats.chunks_degraded += 1,
                ChunkHealth::Critical => stats.chunks_critical += 1,
                ChunkHealth::Lost => stats.chunks_lost += 1,
            }

            if mode == RepairMode::VerifyOnly {
                continue;
            }

            for server in &probe.healthy {
                chunk.mark_verified(server);
                mutated = true;
            }

            // LOST is terminal for this pass: the records stay so that
            // returning servers can be reintegrated later.
            if probe.health == ChunkHealth::Lost {
                warn!(chunk = %chunk.id, "chunk has no healthy replica; keeping records intact");
                manifest.chunks[index] = chunk;
                continue;
            }

            let mut repaired = false;

            // CLEANUP: corrupt replicas go, but only because a verified
            // copy exists (probe.healthy is non-empty here).
            for server in probe.corrupt.iter().chain(probe.unknown_servers.iter()) {
                if let Some(location) = chunk.location_on(server) {
                    let path = location.remote_path.clone();
                    if self.pool.slot(server).is_ok() {
                        if let Err(e) = ops::delete_chunk(&self.pool, server, &path).await {
                            debug!(chunk = %chunk.id, server = %server, error = %e,
                                "failed to delete corrupt replica; dropping record anyway");
                        }
                    }
                }
                if chunk.remove_location(server) {
                    stats.replicas_removed += 1;
                    mutated = true;
                    repaired = true;
                }
            }

            let Some(payload) = probe.payload.clone() else {
                manifest.chunks[index] = chunk;
                continue;
            };

            // Force mode refreshes every recorded replica from the
            // verified payload.
            if mode == RepairMode::Force {
                for server in chunk
                    .locations
                    .iter()
                    .map(|l| l.server_id.clone())
                    .collect::<Vec<_>>()
                {
                    if self.pool.slot(&server).is_err() {
                        continue;
                    }
                    match ops::upload_chunk(
                        &self.pool,
                        &server,
                        &chunk.id,
                        payload.clone(),
                        &TransferControl::none(),
                    )
                    .await
                    {
                        Ok(path) => {
                            chunk.add_location(server.clone(), path);
                            chunk.mark_verified(&server);
                            mutated = true;
                        }
                        Err(e) => {
                            warn!(chunk = %chunk.id, server = %server, error = %e,
                                "forced re-upload failed");
                        }
                    }
                }
            }

            // REFILL toward the replication factor.
            let needed = (target as usize).saturating_sub(chunk.locations.len());
            if needed > 0 {
                let holders: Vec<ServerId> = chunk
                    .locations
                    .iter()
                    .map(|l| l.server_id.clone())
                    .collect();
                let candidates = placement_candidates(&self.pool, manifest);
                let placement = trawl_placement::select_targets(&candidates, &holders, needed);
                if !placement.is_complete() {
                    warn!(
                        chunk = %chunk.id,
                        requested = placement.requested,
                        found = placement.targets.len(),
                        "insufficient servers for full re-replication"
                    );
                }
                for server in placement.targets {
                    match ops::upload_chunk(
                        &self.pool,
                        &server,
                        &chunk.id,
                        payload.clone(),
                        &TransferControl::none(),
                    )
                    .await
                    {
                        Ok(path) => {
                            chunk.add_location(server.clone(), path);
                            chunk.mark_verified(&server);
                            stats.replicas_added += 1;
                            mutated = true;
                            repaired = true;
                        }
                        Err(e) => {
                            warn!(chunk = %chunk.id, server = %server, error = %e,
                                "re-replication upload failed");
                        }
                    }
                }
            }

            if repaired {
                stats.chunks_repaired += 1;
            }
            manifest.chunks[index] = chunk;
        }

        (stats, mutated)
    }
}
