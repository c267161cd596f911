//! Shared types for the trawl distributed storage client.
//!
//! This crate defines the data model used across the workspace: the
//! [`Sha256Digest`] integrity primitive, [`ServerId`], the chunk records
//! stored in a [`FileManifest`] ([`Chunk`], [`ChunkLocation`]), the
//! configured [`ServerDescriptor`], runtime health types, and the
//! statistics structs returned by long-running operations.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Limits and defaults
// ---------------------------------------------------------------------------

/// Maximum number of configurable servers.
pub const MAX_SERVERS: usize = 32;

/// Minimum chunk size: 1 MiB.
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;
/// Maximum chunk size: 64 MiB.
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Minimum replication factor.
pub const MIN_REPLICATION_FACTOR: u32 = 1;
/// Maximum replication factor (also caps a chunk's location list).
pub const MAX_REPLICATION_FACTOR: u32 = 10;
/// Default replication factor.
pub const DEFAULT_REPLICATION_FACTOR: u32 = 3;

/// Maximum replica locations tracked per chunk.
pub const MAX_CHUNK_LOCATIONS: usize = MAX_REPLICATION_FACTOR as usize;

/// Length of a chunk identifier in characters.
pub const CHUNK_ID_LEN: usize = 16;

/// Manifest format version written by this client.
pub const MANIFEST_VERSION: &str = "1.0";

/// File extension of remote manifest files.
pub const MANIFEST_EXTENSION: &str = ".manifest";

/// Current wall-clock time in seconds since the UNIX epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// SHA-256 digest
// ---------------------------------------------------------------------------

/// A SHA-256 digest, serialized as 64 lower-case hex characters.
///
/// This is the integrity oracle for chunks and whole files. It is never
/// recomputed in place: new payload bytes mean a new digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as 64 lower-case hex characters.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push(hex_char(byte >> 4));
            out.push(hex_char(byte & 0x0f));
        }
        out
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HexError> {
        if hex.len() != 64 {
            return Err(HexError::BadLength(hex.len()));
        }
        let raw = hex.as_bytes();
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = hex_nibble(raw[i * 2])?;
            let lo = hex_nibble(raw[i * 2 + 1])?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for Sha256Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Sha256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", self)
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(D::Error::custom)
    }
}

/// Error parsing a hex digest string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    /// The string was not exactly 64 characters long.
    BadLength(usize),
    /// A non-hex character was encountered.
    BadCharacter(char),
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HexError::BadLength(len) => write!(f, "expected 64 hex characters, got {len}"),
            HexError::BadCharacter(c) => write!(f, "invalid hex character {c:?}"),
        }
    }
}

impl std::error::Error for HexError {}

fn hex_char(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'a' + nibble - 10) as char,
    }
}

fn hex_nibble(c: u8) -> Result<u8, HexError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(HexError::BadCharacter(c as char)),
    }
}

// ---------------------------------------------------------------------------
// Server identity and health
// ---------------------------------------------------------------------------

/// Stable identifier of a configured server.
///
/// Assigned at configuration time and embedded in every chunk location
/// referring to the server. Renaming a server invalidates manifests that
/// mention the old id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({})", self.0)
    }
}

/// A configured FTP/FTPS endpoint. Read-only after configuration load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    /// Stable server identifier.
    pub id: ServerId,
    /// Host name or address.
    pub host: String,
    /// Control-connection port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Remote directory under which all trawl data lives.
    pub base_path: String,
    /// Use FTPS instead of plain FTP.
    pub use_ssl: bool,
    /// Use passive mode for data connections.
    pub passive_mode: bool,
    /// Placement tie-break priority; lower wins.
    pub priority: i32,
}

/// Probe-derived availability of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerStatus {
    /// Never probed.
    #[default]
    Unknown,
    /// Last probe succeeded.
    Available,
    /// Last probe failed.
    Unavailable,
}

/// Latest health observation for a server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerHealth {
    /// Probe-derived status.
    pub status: ServerStatus,
    /// Round-trip latency of the last successful probe, in milliseconds.
    pub last_latency_ms: f64,
    /// When the server was last probed (seconds since epoch; 0 = never).
    pub last_checked: u64,
}

impl ServerHealth {
    /// Whether the server may be used for placement and transfers.
    ///
    /// `Unknown` counts as usable: a server that has not been probed yet
    /// must not be excluded from a fresh upload.
    pub fn is_usable(&self) -> bool {
        self.status != ServerStatus::Unavailable
    }
}

// ---------------------------------------------------------------------------
// Chunks and locations
// ---------------------------------------------------------------------------

/// One replica of a chunk on a particular server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLocation {
    /// Server holding the replica.
    pub server_id: ServerId,
    /// Path of the replica below the server's base path.
    pub remote_path: String,
    /// When the replica was uploaded (seconds since epoch).
    pub upload_time: u64,
    /// Whether the replica has ever passed a hash check.
    #[serde(default)]
    pub verified: bool,
    /// When the replica last passed a hash check (0 = never).
    #[serde(default)]
    pub last_verified: u64,
}

/// A fixed-size, content-hashed segment of a file.
///
/// The `hash` is the SHA-256 of the payload and is never updated in
/// place. The `id` is per-file unique and deliberately not an integrity
/// oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Per-file-unique identifier, [`CHUNK_ID_LEN`] characters.
    pub id: String,
    /// 0-based, dense position in the original file.
    pub sequence_number: u32,
    /// Payload size in bytes.
    pub size: u64,
    /// When the chunk was produced (seconds since epoch).
    pub created_timestamp: u64,
    /// SHA-256 of the payload.
    pub hash: Sha256Digest,
    /// Replica set; `server_id`s are pairwise distinct.
    #[serde(default)]
    pub locations: Vec<ChunkLocation>,
}

impl Chunk {
    /// Record a replica on `server_id`, replacing any existing entry for
    /// the same server. Returns `false` when the location list is full.
    pub fn add_location(&mut self, server_id: ServerId, remote_path: String) -> bool {
        if let Some(existing) = self
            .locations
            .iter_mut()
            .find(|loc| loc.server_id == server_id)
        {
            existing.remote_path = remote_path;
            existing.upload_time = now_secs();
            existing.verified = false;
            existing.last_verified = 0;
            return true;
        }
        if self.locations.len() >= MAX_CHUNK_LOCATIONS {
            return false;
        }
        self.locations.push(ChunkLocation {
            server_id,
            remote_path,
            upload_time: now_secs(),
            verified: false,
            last_verified: 0,
        });
        true
    }

    /// Drop the replica record for `server_id`, if present.
    pub fn remove_location(&mut self, server_id: &ServerId) -> bool {
        let before = self.locations.len();
        self.locations.retain(|loc| &loc.server_id != server_id);
        self.locations.len() != before
    }

    /// Find the replica record for `server_id`.
    pub fn location_on(&self, server_id: &ServerId) -> Option<&ChunkLocation> {
        self.locations.iter().find(|loc| &loc.server_id == server_id)
    }

    /// Whether a replica is recorded on `server_id`.
    pub fn has_location(&self, server_id: &ServerId) -> bool {
        self.location_on(server_id).is_some()
    }

    /// Mark the replica on `server_id` as hash-verified now.
    pub fn mark_verified(&mut self, server_id: &ServerId) {
        if let Some(loc) = self
            .locations
            .iter_mut()
            .find(|loc| &loc.server_id == server_id)
        {
            loc.verified = true;
            loc.last_verified = now_secs();
        }
    }
}

/// Health class of a chunk, derived from its count of healthy replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkHealth {
    /// At least `replication_factor` healthy replicas.
    Healthy,
    /// More than one healthy replica, but fewer than the target.
    Degraded,
    /// Exactly one healthy replica.
    Critical,
    /// No healthy replica; unrepairable until a server comes back.
    Lost,
}

impl ChunkHealth {
    /// Classify from a healthy-replica count and the target factor.
    pub fn classify(healthy_replicas: usize, replication_factor: u32) -> Self {
        if healthy_replicas >= replication_factor as usize {
            ChunkHealth::Healthy
        } else if healthy_replicas == 0 {
            ChunkHealth::Lost
        } else if healthy_replicas == 1 {
            ChunkHealth::Critical
        } else {
            ChunkHealth::Degraded
        }
    }
}

impl fmt::Display for ChunkHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkHealth::Healthy => "HEALTHY",
            ChunkHealth::Degraded => "DEGRADED",
            ChunkHealth::Critical => "CRITICAL",
            ChunkHealth::Lost => "LOST",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// File manifest
// ---------------------------------------------------------------------------

/// Durable placement map of one stored file.
///
/// The manifest is the single source of truth: every replica of every
/// chunk is discoverable through it, and no other index exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileManifest {
    /// Manifest format version (`"1.0"`).
    pub version: String,
    /// Unique manifest identifier.
    pub manifest_id: String,
    /// Logical file name the manifest is stored under.
    pub original_filename: String,
    /// Size of the original file in bytes.
    pub total_size: u64,
    /// Chunk size used when splitting; the last chunk may be shorter.
    pub chunk_size: u64,
    /// Number of chunks (`ceil(total_size / chunk_size)`).
    pub chunk_count: u32,
    /// SHA-256 of the whole original file.
    pub file_hash: Sha256Digest,
    /// When the file was chunked (seconds since epoch).
    pub created_timestamp: u64,
    /// Last read access (seconds since epoch).
    #[serde(default)]
    pub last_accessed: u64,
    /// Last mutation of the manifest (seconds since epoch).
    #[serde(default)]
    pub last_modified: u64,
    /// Last integrity verification (0 = never).
    #[serde(default)]
    pub last_verified: u64,
    /// Target replicas per chunk.
    pub replication_factor: u32,
    /// Minimum replicas below which the file counts as at risk.
    pub min_replicas_required: u32,
    /// Free-form creator tag.
    #[serde(default)]
    pub creator_info: String,
    /// Optional operator comment.
    #[serde(default)]
    pub comment: String,
    /// Chunk records, ordered by `sequence_number`.
    pub chunks: Vec<Chunk>,
}

impl FileManifest {
    /// Indices of chunks with fewer than `min_replicas` recorded replicas.
    pub fn under_replicated(&self, min_replicas: usize) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.locations.len() < min_replicas)
            .map(|(i, _)| i)
            .collect()
    }

    /// Replica statistics across all chunks:
    /// `(total_chunk_bytes, avg_replicas, min_replicas, chunks_without_replicas)`.
    pub fn replica_statistics(&self) -> (u64, f64, usize, usize) {
        if self.chunks.is_empty() {
            return (0, 0.0, 0, 0);
        }
        let total_bytes: u64 = self.chunks.iter().map(|c| c.size).sum();
        let replica_sum: usize = self.chunks.iter().map(|c| c.locations.len()).sum();
        let min = self
            .chunks
            .iter()
            .map(|c| c.locations.len())
            .min()
            .unwrap_or(0);
        let missing = self
            .chunks
            .iter()
            .filter(|c| c.locations.is_empty())
            .count();
        let avg = replica_sum as f64 / self.chunks.len() as f64;
        (total_bytes, avg, min, missing)
    }

    /// Update bookkeeping timestamps.
    pub fn touch(&mut self, accessed: bool, modified: bool, verified: bool) {
        let now = now_secs();
        if accessed {
            self.last_accessed = now;
        }
        if modified {
            self.last_modified = now;
        }
        if verified {
            self.last_verified = now;
        }
    }
}

// ---------------------------------------------------------------------------
// Operation statistics
// ---------------------------------------------------------------------------

/// Statistics collected by upload/download operations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferStats {
    /// Payload bytes moved.
    pub bytes_processed: u64,
    /// Chunks moved.
    pub chunks_processed: u32,
    /// Distinct servers touched.
    pub servers_used: u32,
    /// Transport-level retries incurred.
    pub retries_performed: u64,
    /// Wall-clock duration in seconds.
    pub elapsed_seconds: f64,
}

/// Statistics collected by verify/repair runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RepairStats {
    /// Chunks probed.
    pub chunks_verified: u32,
    /// Chunks classified HEALTHY.
    pub chunks_healthy: u32,
    /// Chunks classified DEGRADED.
    pub chunks_degraded: u32,
    /// Chunks classified CRITICAL.
    pub chunks_critical: u32,
    /// Chunks classified LOST.
    pub chunks_lost: u32,
    /// Chunks whose replica set was improved.
    pub chunks_repaired: u32,
    /// Replicas created by refill.
    pub replicas_added: u32,
    /// Corrupt replicas removed by cleanup.
    pub replicas_removed: u32,
    /// Wall-clock duration in seconds.
    pub elapsed_seconds: f64,
}

impl RepairStats {
    /// Fold another run's counters into this one.
    pub fn merge(&mut self, other: &RepairStats) {
        self.chunks_verified += other.chunks_verified;
        self.chunks_healthy += other.chunks_healthy;
        self.chunks_degraded += other.chunks_degraded;
        self.chunks_critical += other.chunks_critical;
        self.chunks_lost += other.chunks_lost;
        self.chunks_repaired += other.chunks_repaired;
        self.replicas_added += other.replicas_added;
        self.replicas_removed += other.replicas_removed;
        self.elapsed_seconds += other.elapsed_seconds;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(byte: u8) -> Sha256Digest {
        Sha256Digest::from_bytes([byte; 32])
    }

    #[test]
    fn test_digest_hex_roundtrip() {
        let bytes = [
            0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71, 0x82, 0x93, 0xa4, 0xb5, 0xc6, 0xd7,
            0xe8, 0xf9, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
            0xcc, 0xdd, 0xee, 0xff,
        ];
        let digest = Sha256Digest::from_bytes(bytes);
        let hex = digest.to_hex();
        assert_eq!(
            hex,
            "0a1b2c3d4e5f60718293a4b5c6d7e8f900112233445566778899aabbccddeeff"
        );
        assert_eq!(Sha256Digest::from_hex(&hex).unwrap(), digest);
    }

    #[test]
    fn test_digest_from_hex_rejects_bad_length() {
        assert_eq!(
            Sha256Digest::from_hex("abcd"),
            Err(HexError::BadLength(4))
        );
    }

    #[test]
    fn test_digest_from_hex_rejects_bad_character() {
        let hex = "zz".repeat(32);
        assert_eq!(
            Sha256Digest::from_hex(&hex),
            Err(HexError::BadCharacter('z'))
        );
    }

    #[test]
    fn test_digest_from_hex_accepts_uppercase() {
        let digest = digest_of(0xAB);
        let upper = digest.to_hex().to_uppercase();
        assert_eq!(Sha256Digest::from_hex(&upper).unwrap(), digest);
    }

    #[test]
    fn test_digest_serde_as_hex_string() {
        let digest = digest_of(0x42);
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", "42".repeat(32)));
        let back: Sha256Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    fn sample_chunk(seq: u32) -> Chunk {
        Chunk {
            id: format!("{seq:08x}aabbccdd"),
            sequence_number: seq,
            size: 1024,
            created_timestamp: 1_700_000_000,
            hash: digest_of(seq as u8),
            locations: Vec::new(),
        }
    }

    #[test]
    fn test_add_location_replaces_same_server() {
        let mut chunk = sample_chunk(0);
        assert!(chunk.add_location(ServerId::from("s1"), "chunks/a".into()));
        assert!(chunk.add_location(ServerId::from("s1"), "chunks/b".into()));
        assert_eq!(chunk.locations.len(), 1);
        assert_eq!(chunk.locations[0].remote_path, "chunks/b");
    }

    #[test]
    fn test_add_location_bounded() {
        let mut chunk = sample_chunk(0);
        for i in 0..MAX_CHUNK_LOCATIONS {
            assert!(chunk.add_location(ServerId::new(format!("s{i}")), "p".into()));
        }
        assert!(!chunk.add_location(ServerId::from("overflow"), "p".into()));
        assert_eq!(chunk.locations.len(), MAX_CHUNK_LOCATIONS);
    }

    #[test]
    fn test_remove_location() {
        let mut chunk = sample_chunk(0);
        chunk.add_location(ServerId::from("s1"), "p".into());
        chunk.add_location(ServerId::from("s2"), "p".into());
        assert!(chunk.remove_location(&ServerId::from("s1")));
        assert!(!chunk.remove_location(&ServerId::from("s1")));
        assert_eq!(chunk.locations.len(), 1);
        assert!(chunk.has_location(&ServerId::from("s2")));
    }

    #[test]
    fn test_mark_verified() {
        let mut chunk = sample_chunk(0);
        chunk.add_location(ServerId::from("s1"), "p".into());
        assert!(!chunk.locations[0].verified);
        chunk.mark_verified(&ServerId::from("s1"));
        assert!(chunk.locations[0].verified);
        assert!(chunk.locations[0].last_verified > 0);
    }

    #[test]
    fn test_health_classification_table() {
        // R = 3.
        assert_eq!(ChunkHealth::classify(0, 3), ChunkHealth::Lost);
        assert_eq!(ChunkHealth::classify(1, 3), ChunkHealth::Critical);
        assert_eq!(ChunkHealth::classify(2, 3), ChunkHealth::Degraded);
        assert_eq!(ChunkHealth::classify(3, 3), ChunkHealth::Healthy);
        assert_eq!(ChunkHealth::classify(5, 3), ChunkHealth::Healthy);
        // R = 1: a single healthy replica meets the target.
        assert_eq!(ChunkHealth::classify(1, 1), ChunkHealth::Healthy);
        assert_eq!(ChunkHealth::classify(0, 1), ChunkHealth::Lost);
    }

    fn sample_manifest() -> FileManifest {
        FileManifest {
            version: MANIFEST_VERSION.to_string(),
            manifest_id: "manifest_00112233_deadbeef_cafebabe_00000000".to_string(),
            original_filename: "report.pdf".to_string(),
            total_size: 2048,
            chunk_size: 1024,
            chunk_count: 2,
            file_hash: digest_of(0xff),
            created_timestamp: 1_700_000_000,
            last_accessed: 0,
            last_modified: 0,
            last_verified: 0,
            replication_factor: 3,
            min_replicas_required: 1,
            creator_info: "trawl v1.0".to_string(),
            comment: String::new(),
            chunks: vec![sample_chunk(0), sample_chunk(1)],
        }
    }

    #[test]
    fn test_manifest_json_field_names() {
        let manifest = sample_manifest();
        let value: serde_json::Value = serde_json::to_value(&manifest).unwrap();
        for key in [
            "version",
            "manifest_id",
            "original_filename",
            "total_size",
            "chunk_size",
            "chunk_count",
            "file_hash",
            "created_timestamp",
            "last_accessed",
            "last_modified",
            "last_verified",
            "replication_factor",
            "min_replicas_required",
            "creator_info",
            "comment",
            "chunks",
        ] {
            assert!(value.get(key).is_some(), "missing manifest field {key}");
        }
        let chunk = &value["chunks"][0];
        for key in ["id", "sequence_number", "size", "created_timestamp", "hash", "locations"] {
            assert!(chunk.get(key).is_some(), "missing chunk field {key}");
        }
    }

    #[test]
    fn test_manifest_json_roundtrip() {
        let mut manifest = sample_manifest();
        manifest.chunks[0].add_location(ServerId::from("s1"), "chunks/abc".into());
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let back: FileManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_manifest_ignores_unknown_fields() {
        let mut value = serde_json::to_value(sample_manifest()).unwrap();
        value["future_field"] = serde_json::json!({"nested": true});
        let back: FileManifest = serde_json::from_value(value).unwrap();
        assert_eq!(back.original_filename, "report.pdf");
    }

    #[test]
    fn test_manifest_missing_required_field_fails() {
        let mut value = serde_json::to_value(sample_manifest()).unwrap();
        value.as_object_mut().unwrap().remove("file_hash");
        assert!(serde_json::from_value::<FileManifest>(value).is_err());
    }

    #[test]
    fn test_under_replicated() {
        let mut manifest = sample_manifest();
        manifest.chunks[0].add_location(ServerId::from("s1"), "p".into());
        let under = manifest.under_replicated(1);
        assert_eq!(under, vec![1]);
    }

    #[test]
    fn test_replica_statistics() {
        let mut manifest = sample_manifest();
        manifest.chunks[0].add_location(ServerId::from("s1"), "p".into());
        manifest.chunks[0].add_location(ServerId::from("s2"), "p".into());
        let (bytes, avg, min, missing) = manifest.replica_statistics();
        assert_eq!(bytes, 2048);
        assert!((avg - 1.0).abs() < f64::EPSILON);
        assert_eq!(min, 0);
        assert_eq!(missing, 1);
    }

    #[test]
    fn test_server_health_usable() {
        let mut health = ServerHealth::default();
        assert!(health.is_usable(), "unprobed servers must stay usable");
        health.status = ServerStatus::Unavailable;
        assert!(!health.is_usable());
        health.status = ServerStatus::Available;
        assert!(health.is_usable());
    }
}
