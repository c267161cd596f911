//! Whole-file operation orchestration.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use trawl_cas::FileChunker;
use trawl_manifest as manifest_codec;
use trawl_manifest::ManifestStore;
use trawl_repair::{placement_candidates, RepairEngine, RepairMode, SystemHealth};
use trawl_transport::{ops, ServerPool, TransferControl};
use trawl_types::{FileManifest, RepairStats, ServerId, TransferStats};

use crate::error::EngineError;
use crate::progress::{NullProgress, ProgressEvent, ProgressSink};

/// Operation parameters shared by the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Split size for new uploads, in bytes.
    pub chunk_size: u64,
    /// Target replicas per chunk.
    pub replication_factor: u32,
    /// Re-hash downloaded files against the manifest's file hash.
    pub always_verify_integrity: bool,
}

/// Orchestrator for whole-file operations against the server pool.
pub struct TrawlEngine {
    pool: Arc<ServerPool>,
    repair: RepairEngine,
    config: EngineConfig,
    progress: Arc<dyn ProgressSink>,
    local_manifests: Option<ManifestStore>,
}

impl TrawlEngine {
    /// Create an engine over a shared pool.
    pub fn new(pool: Arc<ServerPool>, config: EngineConfig) -> Self {
        Self {
            repair: RepairEngine::new(pool.clone()),
            pool,
            config,
            progress: Arc::new(NullProgress),
            local_manifests: None,
        }
    }

    /// Attach a progress sink for long-running operations.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Keep a local copy of every manifest this engine touches.
    pub fn with_local_manifests(mut self, store: ManifestStore) -> Self {
        self.local_manifests = Some(store);
        self
    }

    /// Best-effort write into the local manifest cache.
    async fn cache_manifest(&self, remote_name: &str, manifest: &FileManifest) {
        if let Some(store) = &self.local_manifests {
            if let Err(e) = store.save(remote_name, manifest).await {
                warn!(remote = remote_name, error = %e, "local manifest cache write failed");
            }
        }
    }

    /// The underlying server pool.
    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    /// Report a progress event; `Err(Cancelled)` when the sink declines.
    fn report(&self, event: ProgressEvent<'_>) -> Result<(), EngineError> {
        if self.progress.report(&event) {
            Ok(())
        } else {
            Err(EngineError::Cancelled)
        }
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Upload a local file under `remote_name`.
    ///
    /// Each chunk is fanned out to up to `replication_factor` servers in
    /// parallel. A chunk that lands on no server fails the upload; one
    /// that lands on fewer servers than the target is recorded as-is and
    /// left for the repair engine. The manifest is written to every
    /// server at the end and must stick on at least one.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<TransferStats, EngineError> {
        let started = Instant::now();
        let retries_before = self.pool.retries_performed();
        let factor = self.config.replication_factor as usize;

        info!(
            local = %local_path.display(),
            remote = remote_name,
            chunk_size = self.config.chunk_size,
            replication = factor,
            "upload starting"
        );

        let mut chunker = FileChunker::open(local_path, self.config.chunk_size).await?;
        let total_bytes = chunker.total_size();
        let total_chunks = chunker.total_chunks() as u64;
        self.report(ProgressEvent {
            operation: "Preparing upload",
            current: 0,
            total: 1,
            bytes_processed: 0,
            bytes_total: total_bytes,
        })?;

        let mut manifest = manifest_codec::build_manifest(
            remote_name,
            total_bytes,
            self.config.chunk_size,
            chunker.file_hash(),
            self.config.replication_factor,
        );

        let ctl = TransferControl::none();
        let mut servers_used: HashSet<ServerId> = HashSet::new();
        let mut bytes_processed = 0u64;

        while let Some(payload) = chunker.next_chunk().await? {
            let mut chunk = payload.chunk;
            self.report(ProgressEvent {
                operation: "Uploading chunks",
                current: chunk.sequence_number as u64,
                total: total_chunks,
                bytes_processed,
                bytes_total: total_bytes,
            })
            .inspect_err(|_| ctl.cancel())?;

            let candidates = placement_candidates(&self.pool, &manifest);
            let placement = trawl_placement::select_targets(&candidates, &[], factor);
            if placement.targets.is_empty() {
                return Err(EngineError::InsufficientServers {
                    needed: factor,
                    available: 0,
                });
            }
            if !placement.is_complete() {
                warn!(
                    chunk = %chunk.id,
                    requested = placement.requested,
                    found = placement.targets.len(),
                    "placing chunk with reduced redundancy"
                );
            }

            // Fan out one upload per target server. Results are folded
            // back in placement order so replica lists are stable.
            let mut tasks = tokio::task::JoinSet::new();
            for server in placement.targets.clone() {
                let pool = self.pool.clone();
                let chunk_id = chunk.id.clone();
                let data = payload.data.clone();
                let ctl = ctl.clone();
                tasks.spawn(async move {
                    let result = ops::upload_chunk(&pool, &server, &chunk_id, data, &ctl).await;
                    (server, result)
                });
            }

            let mut uploaded: std::collections::HashMap<ServerId, String> =
                std::collections::HashMap::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((server, Ok(remote_path))) => {
                        uploaded.insert(server, remote_path);
                    }
                    Ok((server, Err(e))) => {
                        warn!(chunk = %chunk.id, server = %server, error = %e, "replica upload failed");
                    }
                    Err(e) => warn!(chunk = %chunk.id, error = %e, "upload task failed"),
                }
            }

            let mut successes = 0usize;
            for server in &placement.targets {
                if let Some(remote_path) = uploaded.remove(server) {
                    chunk.add_location(server.clone(), remote_path);
                    servers_used.insert(server.clone());
                    successes += 1;
                }
            }

            if successes == 0 {
                return Err(EngineError::UploadFailed(format!(
                    "chunk {} (sequence {}) landed on no server",
                    chunk.id, chunk.sequence_number
                )));
            }
            if successes < factor {
                warn!(
                    chunk = %chunk.id,
                    replicas = successes,
                    target = factor,
                    "chunk stored with reduced redundancy; repair will refill"
                );
            }

            bytes_processed += chunk.size;
            manifest.chunks.push(chunk);
        }

        // Persist the placement map on every server; one copy is enough
        // to survive, zero fails the upload.
        self.report(ProgressEvent {
            operation: "Saving manifest",
            current: total_chunks,
            total: total_chunks,
            bytes_processed,
            bytes_total: total_bytes,
        })?;
        let json = manifest_codec::to_json(&manifest)?;
        let mut manifest_copies = 0usize;
        for server_id in self.pool.server_ids() {
            match ops::upload_manifest(&self.pool, &server_id, remote_name, &json).await {
                Ok(()) => manifest_copies += 1,
                Err(e) => {
                    warn!(server = %server_id, error = %e, "manifest upload failed");
                }
            }
        }
        if manifest_copies == 0 {
            return Err(EngineError::UploadFailed(format!(
                "manifest for {remote_name} could not be stored on any server"
            )));
        }
        self.cache_manifest(remote_name, &manifest).await;

        let stats = TransferStats {
            bytes_processed,
            chunks_processed: manifest.chunks.len() as u32,
            servers_used: servers_used.len() as u32,
            retries_performed: self.pool.retries_performed() - retries_before,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };
        info!(
            remote = remote_name,
            bytes = stats.bytes_processed,
            chunks = stats.chunks_processed,
            servers = stats.servers_used,
            retries = stats.retries_performed,
            "upload complete"
        );
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------

    /// Reassemble `remote_name` into a local file.
    ///
    /// Chunks are fetched in sequence order; within a chunk, recorded
    /// replicas are tried until one hash-verifies. A chunk with no
    /// verifiable replica aborts the download and removes the partial
    /// output.
    pub async fn download(
        &self,
        remote_name: &str,
        local_path: &Path,
    ) -> Result<TransferStats, EngineError> {
        let started = Instant::now();
        let retries_before = self.pool.retries_performed();

        self.report(ProgressEvent {
            operation: "Loading manifest",
            current: 0,
            total: 1,
            bytes_processed: 0,
            bytes_total: 0,
        })?;
        let manifest = self.repair.fetch_manifest(remote_name).await?;
        self.cache_manifest(remote_name, &manifest).await;
        let total_chunks = manifest.chunks.len() as u64;
        let total_bytes = manifest.total_size;

        let mut output = tokio::fs::File::create(local_path).await?;
        let mut bytes_processed = 0u64;
        let mut servers_used: HashSet<ServerId> = HashSet::new();

        for chunk in &manifest.chunks {
            if let Err(e) = self.report(ProgressEvent {
                operation: "Downloading chunks",
                current: chunk.sequence_number as u64,
                total: total_chunks,
                bytes_processed,
                bytes_total: total_bytes,
            }) {
                drop(output);
                let _ = tokio::fs::remove_file(local_path).await;
                return Err(e);
            }

            let mut payload = None;
            for location in &chunk.locations {
                if self.pool.slot(&location.server_id).is_err() {
                    debug!(chunk = %chunk.id, server = %location.server_id, "skipping unknown server");
                    continue;
                }
                match ops::download_chunk(
                    &self.pool,
                    &location.server_id,
                    &location.remote_path,
                    &chunk.hash,
                    &TransferControl::none(),
                )
                .await
                {
                    Ok(data) => {
                        servers_used.insert(location.server_id.clone());
                        payload = Some(data);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            chunk = %chunk.id,
                            server = %location.server_id,
                            error = %e,
                            "replica fetch failed, trying next"
                        );
                    }
                }
            }

            let Some(data) = payload else {
                drop(output);
                let _ = tokio::fs::remove_file(local_path).await;
                return Err(EngineError::DownloadFailed(format!(
                    "no replica of chunk {} (sequence {}) could be verified",
                    chunk.id, chunk.sequence_number
                )));
            };

            output.write_all(&data).await?;
            bytes_processed += data.len() as u64;
        }

        output.sync_all().await?;
        drop(output);

        if self.config.always_verify_integrity {
            let (actual, _) = trawl_cas::hash::sha256_file(local_path).await?;
            if actual != manifest.file_hash {
                let _ = tokio::fs::remove_file(local_path).await;
                return Err(EngineError::DownloadFailed(format!(
                    "reassembled file hash {actual} does not match manifest {}",
                    manifest.file_hash
                )));
            }
        }

        let stats = TransferStats {
            bytes_processed,
            chunks_processed: manifest.chunks.len() as u32,
            servers_used: servers_used.len() as u32,
            retries_performed: self.pool.retries_performed() - retries_before,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };
        info!(
            remote = remote_name,
            local = %local_path.display(),
            bytes = stats.bytes_processed,
            retries = stats.retries_performed,
            "download complete"
        );
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Delete, list, verify, health
    // ------------------------------------------------------------------

    /// Remove every replica of every chunk, then the manifest itself.
    ///
    /// Replica deletions are best effort; a server that cannot be
    /// reached is logged and skipped.
    pub async fn delete(&self, remote_name: &str) -> Result<(), EngineError> {
        let manifest = self.repair.fetch_manifest(remote_name).await?;

        for chunk in &manifest.chunks {
            for location in &chunk.locations {
                if self.pool.slot(&location.server_id).is_err() {
                    continue;
                }
                if let Err(e) =
                    ops::delete_chunk(&self.pool, &location.server_id, &location.remote_path).await
                {
                    warn!(
                        chunk = %chunk.id,
                        server = %location.server_id,
                        error = %e,
                        "replica delete failed"
                    );
                }
            }
        }

        for server_id in self.pool.server_ids() {
            if let Err(e) = ops::delete_manifest(&self.pool, &server_id, remote_name).await {
                warn!(server = %server_id, error = %e, "manifest delete failed");
            }
        }

        if let Some(store) = &self.local_manifests {
            match store.delete(remote_name).await {
                Ok(()) | Err(trawl_manifest::ManifestError::NotFound(_)) => {}
                Err(e) => warn!(remote = remote_name, error = %e, "local manifest delete failed"),
            }
        }

        info!(remote = remote_name, "file deleted");
        Ok(())
    }

    /// Fetch every stored file's manifest (union across servers).
    pub async fn list(&self) -> Result<Vec<FileManifest>, EngineError> {
        let names = ops::list_manifest_names(&self.pool).await?;
        let mut manifests = Vec::with_capacity(names.len());
        for name in names {
            match self.repair.fetch_manifest(&name).await {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable manifest"),
            }
        }
        Ok(manifests)
    }

    /// Verify one file, repairing when `repair` is set.
    pub async fn verify(&self, remote_name: &str, repair: bool) -> Result<RepairStats, EngineError> {
        let mode = if repair {
            RepairMode::Auto
        } else {
            RepairMode::VerifyOnly
        };
        Ok(self.repair.repair_file(remote_name, mode).await?)
    }

    /// Even out one file's replicas across servers.
    pub async fn rebalance(&self, remote_name: &str) -> Result<usize, EngineError> {
        Ok(self.repair.rebalance_file(remote_name).await?)
    }

    /// Store-wide file health summary.
    pub async fn system_health(&self) -> Result<SystemHealth, EngineError> {
        Ok(self.repair.system_health().await?)
    }

    /// Probe every server; returns `(healthy, total)`.
    pub async fn health_check(&self) -> (u32, u32) {
        let results = self.pool.ping_all().await;
        let healthy = results.iter().filter(|(_, r)| r.is_ok()).count() as u32;
        (healthy, results.len() as u32)
    }
}
