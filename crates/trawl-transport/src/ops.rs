//! Chunk and manifest operations on the wire.
//!
//! Layout on every server, below its base path:
//!
//! ```text
//! chunks/<chunk_id>                 raw chunk bytes
//! manifests/<remote_name>.manifest  manifest JSON
//! ```
//!
//! Uploads are atomic from the caller's perspective: bytes land under a
//! `.tmp` name and are renamed into place, so a partial upload never
//! becomes a discoverable replica. Chunk downloads are verified against
//! the expected digest before they are handed back.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use trawl_types::{ServerId, Sha256Digest, MANIFEST_EXTENSION};

use crate::error::TransportError;
use crate::pool::ServerPool;
use crate::progress::TransferControl;

/// Directory of chunk replicas below the base path.
pub const CHUNKS_DIR: &str = "chunks";
/// Directory of manifests below the base path.
pub const MANIFESTS_DIR: &str = "manifests";

/// Remote path of a chunk replica. Deterministic per chunk id; the same
/// on every server.
pub fn chunk_remote_path(chunk_id: &str) -> String {
    format!("{CHUNKS_DIR}/{chunk_id}")
}

/// Remote path of a manifest.
pub fn manifest_remote_path(remote_name: &str) -> String {
    format!("{MANIFESTS_DIR}/{remote_name}{MANIFEST_EXTENSION}")
}

/// Upload `data` to `path` on one server atomically: parent directory
/// ensured, bytes staged at `<path>.tmp`, then renamed into place. A
/// failed rename removes the stage file best-effort.
pub async fn upload_atomic(
    pool: &ServerPool,
    server_id: &ServerId,
    path: &str,
    data: Bytes,
    ctl: &TransferControl,
) -> Result<(), TransportError> {
    let path = path.to_string();
    let tmp = format!("{path}.tmp");
    let dir = path.rsplit_once('/').map(|(dir, _)| dir.to_string());

    pool.run(server_id, "upload", move |store| {
        let data = data.clone();
        let ctl = ctl.clone();
        let path = path.clone();
        let tmp = tmp.clone();
        let dir = dir.clone();
        async move {
            if let Some(dir) = dir {
                store.mkdir(&dir).await?;
            }
            store.upload(&tmp, data, &ctl).await?;
            if let Err(e) = store.rename(&tmp, &path).await {
                let _ = store.delete(&tmp).await;
                return Err(e);
            }
            Ok(())
        }
    })
    .await
}

/// Upload one chunk replica; returns the remote path recorded in the
/// manifest location.
pub async fn upload_chunk(
    pool: &ServerPool,
    server_id: &ServerId,
    chunk_id: &str,
    data: Bytes,
    ctl: &TransferControl,
) -> Result<String, TransportError> {
    let path = chunk_remote_path(chunk_id);
    upload_atomic(pool, server_id, &path, data, ctl).await?;
    debug!(server = %server_id, chunk = chunk_id, "chunk replica uploaded");
    Ok(path)
}

/// Download one chunk replica and verify it against `expected`.
///
/// A payload that downloads but does not hash to `expected` yields
/// [`TransportError::Integrity`]; the caller decides whether that
/// condemns the replica.
pub async fn download_chunk(
    pool: &ServerPool,
    server_id: &ServerId,
    remote_path: &str,
    expected: &Sha256Digest,
    ctl: &TransferControl,
) -> Result<Bytes, TransportError> {
    let path = remote_path.to_string();
    let data = pool
        .run(server_id, "download", move |store| {
            let path = path.clone();
            let ctl = ctl.clone();
            async move { store.download(&path, &ctl).await }
        })
        .await?;

    let actual = Sha256Digest::from_bytes(Sha256::digest(&data).into());
    if &actual != expected {
        return Err(TransportError::Integrity {
            path: remote_path.to_string(),
            expected: *expected,
            actual,
        });
    }
    Ok(data)
}

/// Delete one chunk replica.
pub async fn delete_chunk(
    pool: &ServerPool,
    server_id: &ServerId,
    remote_path: &str,
) -> Result<(), TransportError> {
    let path = remote_path.to_string();
    pool.run(server_id, "delete", move |store| {
        let path = path.clone();
        async move { store.delete(&path).await }
    })
    .await
}

/// Upload a manifest to one server, atomically.
pub async fn upload_manifest(
    pool: &ServerPool,
    server_id: &ServerId,
    remote_name: &str,
    json: &str,
) -> Result<(), TransportError> {
    let path = manifest_remote_path(remote_name);
    upload_atomic(
        pool,
        server_id,
        &path,
        Bytes::from(json.as_bytes().to_vec()),
        &TransferControl::none(),
    )
    .await
}

/// Fetch a manifest from the first server that serves it.
///
/// Servers are tried in configuration order; per-server failures are
/// logged and skipped. The error of the last server is returned when
/// none responds.
pub async fn fetch_manifest(
    pool: &ServerPool,
    remote_name: &str,
) -> Result<(ServerId, Bytes), TransportError> {
    let path = manifest_remote_path(remote_name);
    let mut last_err = TransportError::NotFound(path.clone());

    for server_id in pool.server_ids() {
        let path = path.clone();
        let result = pool
            .run(&server_id, "download", move |store| {
                let path = path.clone();
                let ctl = TransferControl::none();
                async move { store.download(&path, &ctl).await }
            })
            .await;
        match result {
            Ok(bytes) => return Ok((server_id, bytes)),
            Err(e) => {
                debug!(server = %server_id, name = remote_name, error = %e, "manifest fetch failed");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Delete a manifest from one server.
pub async fn delete_manifest(
    pool: &ServerPool,
    server_id: &ServerId,
    remote_name: &str,
) -> Result<(), TransportError> {
    let path = manifest_remote_path(remote_name);
    pool.run(server_id, "delete", move |store| {
        let path = path.clone();
        async move { store.delete(&path).await }
    })
    .await
}

/// Union of manifest names across all responsive servers, deduplicated.
///
/// Stage files and local backups are filtered out. Fails only when no
/// server answers the listing at all.
pub async fn list_manifest_names(pool: &ServerPool) -> Result<Vec<String>, TransportError> {
    let mut names = Vec::new();
    let mut any_ok = false;
    let mut last_err = TransportError::NotFound(MANIFESTS_DIR.to_string());

    for server_id in pool.server_ids() {
        let result = pool
            .run(&server_id, "list", move |store| async move {
                store.list(MANIFESTS_DIR).await
            })
            .await;
        match result {
            Ok(entries) => {
                any_ok = true;
                for entry in entries {
                    if let Some(name) = entry.strip_suffix(MANIFEST_EXTENSION) {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                warn!(server = %server_id, error = %e, "manifest listing failed");
                last_err = e;
            }
        }
    }

    if any_ok {
        names.sort();
        Ok(names)
    } else {
        Err(last_err)
    }
}
