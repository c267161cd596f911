//! Manifest construction, validation, and JSON (de)serialization.

use rand::Rng;
use trawl_types::{
    now_secs, FileManifest, Sha256Digest, MANIFEST_VERSION, MAX_CHUNK_LOCATIONS, MAX_CHUNK_SIZE,
    MIN_CHUNK_SIZE,
};

use crate::error::ManifestError;

/// Initialize a manifest for a new upload.
///
/// The chunk list starts empty and is filled as uploads complete;
/// `chunk_count` is fixed up front from the file size.
pub fn build_manifest(
    remote_name: &str,
    total_size: u64,
    chunk_size: u64,
    file_hash: Sha256Digest,
    replication_factor: u32,
) -> FileManifest {
    let now = now_secs();
    FileManifest {
        version: MANIFEST_VERSION.to_string(),
        manifest_id: generate_manifest_id(&file_hash),
        original_filename: remote_name.to_string(),
        total_size,
        chunk_size,
        chunk_count: total_size.div_ceil(chunk_size) as u32,
        file_hash,
        created_timestamp: now,
        last_accessed: now,
        last_modified: now,
        last_verified: 0,
        replication_factor,
        min_replicas_required: 1,
        creator_info: format!("trawl v{}", env!("CARGO_PKG_VERSION")),
        comment: String::new(),
        chunks: Vec::new(),
    }
}

/// Build a unique manifest id from a file-hash prefix and random bytes.
pub fn generate_manifest_id(file_hash: &Sha256Digest) -> String {
    let random: [u8; 12] = rand::thread_rng().gen();
    let fh = file_hash.as_bytes();
    format!(
        "manifest_{:02x}{:02x}{:02x}{:02x}_{:02x}{:02x}{:02x}{:02x}_{:02x}{:02x}{:02x}{:02x}_{:02x}{:02x}{:02x}{:02x}",
        fh[0], fh[1], fh[2], fh[3],
        random[0], random[1], random[2], random[3],
        random[4], random[5], random[6], random[7],
        random[8], random[9], random[10], random[11],
    )
}

/// Serialize a manifest to pretty JSON.
pub fn to_json(manifest: &FileManifest) -> Result<String, ManifestError> {
    serde_json::to_string_pretty(manifest).map_err(|e| ManifestError::Corrupt(e.to_string()))
}

/// Parse and validate a manifest from JSON.
///
/// Unknown fields are ignored for forward compatibility; missing
/// required fields and invariant violations yield
/// [`ManifestError::Corrupt`].
pub fn from_json(json: &str) -> Result<FileManifest, ManifestError> {
    let manifest: FileManifest =
        serde_json::from_str(json).map_err(|e| ManifestError::Corrupt(e.to_string()))?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Assert every structural invariant of a manifest.
pub fn validate(manifest: &FileManifest) -> Result<(), ManifestError> {
    let corrupt = |reason: String| Err(ManifestError::Corrupt(reason));

    // Readers accept equal or lesser major versions.
    let major = manifest
        .version
        .split('.')
        .next()
        .and_then(|v| v.parse::<u32>().ok());
    let supported_major: u32 = MANIFEST_VERSION
        .split('.')
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    match major {
        Some(m) if m <= supported_major => {}
        Some(m) => return corrupt(format!("unsupported manifest version {m}.x")),
        None => return corrupt(format!("unparseable version {:?}", manifest.version)),
    }

    if manifest.original_filename.is_empty() {
        return corrupt("empty original_filename".to_string());
    }
    if manifest.chunk_size < MIN_CHUNK_SIZE || manifest.chunk_size > MAX_CHUNK_SIZE {
        return corrupt(format!("chunk_size {} out of range", manifest.chunk_size));
    }
    if manifest.min_replicas_required > manifest.replication_factor {
        return corrupt(format!(
            "min_replicas_required {} exceeds replication_factor {}",
            manifest.min_replicas_required, manifest.replication_factor
        ));
    }

    let expected_count = manifest.total_size.div_ceil(manifest.chunk_size) as u32;
    if manifest.chunk_count != expected_count {
        return corrupt(format!(
            "chunk_count {} does not match ceil({} / {}) = {expected_count}",
            manifest.chunk_count, manifest.total_size, manifest.chunk_size
        ));
    }
    if manifest.chunks.len() != manifest.chunk_count as usize {
        return corrupt(format!(
            "chunks array has {} entries, chunk_count says {}",
            manifest.chunks.len(),
            manifest.chunk_count
        ));
    }

    let size_sum: u64 = manifest.chunks.iter().map(|c| c.size).sum();
    if size_sum != manifest.total_size {
        return corrupt(format!(
            "chunk sizes sum to {size_sum}, total_size is {}",
            manifest.total_size
        ));
    }

    for (i, chunk) in manifest.chunks.iter().enumerate() {
        if chunk.sequence_number as usize != i {
            return corrupt(format!(
                "chunk at index {i} has sequence_number {}",
                chunk.sequence_number
            ));
        }
        if chunk.id.is_empty() {
            return corrupt(format!("chunk {i} has an empty id"));
        }
        if chunk.size == 0 {
            return corrupt(format!("chunk {i} has zero size"));
        }
        if i + 1 < manifest.chunks.len() && chunk.size != manifest.chunk_size {
            return corrupt(format!(
                "non-final chunk {i} has size {} instead of {}",
                chunk.size, manifest.chunk_size
            ));
        }
        if chunk.locations.len() > MAX_CHUNK_LOCATIONS {
            return corrupt(format!(
                "chunk {i} records {} locations (limit {MAX_CHUNK_LOCATIONS})",
                chunk.locations.len()
            ));
        }
        for (j, loc) in chunk.locations.iter().enumerate() {
            if chunk.locations[..j]
                .iter()
                .any(|other| other.server_id == loc.server_id)
            {
                return corrupt(format!(
                    "chunk {i} has duplicate replica on server {}",
                    loc.server_id
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_types::{Chunk, ServerId};

    fn digest(byte: u8) -> Sha256Digest {
        Sha256Digest::from_bytes([byte; 32])
    }

    fn chunk(seq: u32, size: u64) -> Chunk {
        Chunk {
            id: format!("{seq:08x}00112233"),
            sequence_number: seq,
            size,
            created_timestamp: 1_700_000_000,
            hash: digest(seq as u8),
            locations: Vec::new(),
        }
    }

    /// 10 MiB file split at 4 MiB: sizes 4 MiB, 4 MiB, 2 MiB.
    fn valid_manifest() -> FileManifest {
        let chunk_size = 4 * 1024 * 1024;
        let total = 10 * 1024 * 1024;
        let mut m = build_manifest("report.bin", total, chunk_size, digest(9), 3);
        m.chunks = vec![
            chunk(0, chunk_size),
            chunk(1, chunk_size),
            chunk(2, total - 2 * chunk_size),
        ];
        m
    }

    #[test]
    fn test_build_manifest_counts() {
        let m = valid_manifest();
        assert_eq!(m.chunk_count, 3);
        assert_eq!(m.version, MANIFEST_VERSION);
        assert!(m.manifest_id.starts_with("manifest_"));
        assert_eq!(m.min_replicas_required, 1);
    }

    #[test]
    fn test_manifest_id_embeds_hash_prefix() {
        let id = generate_manifest_id(&digest(0xab));
        assert!(id.starts_with("manifest_abababab_"));
        assert_ne!(id, generate_manifest_id(&digest(0xab)));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut m = valid_manifest();
        m.chunks[0].add_location(ServerId::from("s1"), "chunks/x".into());
        let json = to_json(&m).unwrap();
        let back = from_json(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            from_json("not json at all"),
            Err(ManifestError::Corrupt(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_missing_field() {
        let mut value = serde_json::to_value(valid_manifest()).unwrap();
        value.as_object_mut().unwrap().remove("chunk_count");
        let json = value.to_string();
        assert!(matches!(from_json(&json), Err(ManifestError::Corrupt(_))));
    }

    #[test]
    fn test_validate_accepts_valid() {
        validate(&valid_manifest()).unwrap();
    }

    #[test]
    fn test_validate_rejects_newer_major_version() {
        let mut m = valid_manifest();
        m.version = "2.0".to_string();
        assert!(validate(&m).is_err());
        m.version = "1.7".to_string();
        validate(&m).unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_chunk_count() {
        let mut m = valid_manifest();
        m.chunk_count = 4;
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_size_mismatch() {
        let mut m = valid_manifest();
        m.chunks[2].size += 1;
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_sparse_sequence() {
        let mut m = valid_manifest();
        m.chunks[1].sequence_number = 5;
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_chunk_size_out_of_range() {
        let mut m = valid_manifest();
        m.chunk_size = 1024;
        // Keep derived fields consistent so only the range check fires.
        m.chunk_count = m.total_size.div_ceil(m.chunk_size) as u32;
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_replica_server() {
        let mut m = valid_manifest();
        m.chunks[0].locations.push(trawl_types::ChunkLocation {
            server_id: ServerId::from("s1"),
            remote_path: "a".into(),
            upload_time: 0,
            verified: false,
            last_verified: 0,
        });
        m.chunks[0].locations.push(trawl_types::ChunkLocation {
            server_id: ServerId::from("s1"),
            remote_path: "b".into(),
            upload_time: 0,
            verified: false,
            last_verified: 0,
        });
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_min_replicas_above_factor() {
        let mut m = valid_manifest();
        m.min_replicas_required = 5;
        m.replication_factor = 3;
        assert!(validate(&m).is_err());
    }
}
