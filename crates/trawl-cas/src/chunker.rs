//! Streaming file chunker.
//!
//! Splits an input file into fixed-size chunks, each carrying its own
//! SHA-256 and a per-file-unique id. The last chunk may be shorter but
//! is never empty; zero-length inputs are rejected up front.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use rand::Rng;
use tokio::io::AsyncReadExt;
use trawl_types::{now_secs, Chunk, Sha256Digest, CHUNK_ID_LEN};

use crate::error::CasError;
use crate::hash;

/// A produced chunk record together with its payload bytes.
///
/// The chunker owns the in-flight buffer until it is handed out here;
/// after that the payload belongs to the caller.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    /// Chunk metadata (id, sequence, size, hash, empty location set).
    pub chunk: Chunk,
    /// The raw payload.
    pub data: Bytes,
}

/// Streaming chunker over a local file.
///
/// Construction runs a hash pre-pass over the whole file, so
/// [`file_hash`](Self::file_hash) is available before the first chunk.
/// Restart by calling [`FileChunker::open`] again on the same path.
#[derive(Debug)]
pub struct FileChunker {
    path: PathBuf,
    file: tokio::fs::File,
    chunk_size: u64,
    total_size: u64,
    file_hash: Sha256Digest,
    next_sequence: u32,
    bytes_processed: u64,
    finished: bool,
}

impl FileChunker {
    /// Open `path` for chunking with the given split size.
    ///
    /// Fails with `InvalidArgument` for a zero `chunk_size` or a
    /// zero-length file, and `FileNotFound` when the path does not exist.
    pub async fn open(path: &Path, chunk_size: u64) -> Result<Self, CasError> {
        if chunk_size == 0 {
            return Err(CasError::InvalidArgument("chunk_size must be non-zero"));
        }

        // Pre-pass: whole-file hash and size in one read.
        let (file_hash, total_size) = hash::sha256_file(path).await?;
        if total_size == 0 {
            return Err(CasError::InvalidArgument("refusing to chunk an empty file"));
        }

        let file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CasError::FileNotFound(path.to_path_buf())
            } else {
                CasError::Io(e)
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            chunk_size,
            total_size,
            file_hash,
            next_sequence: 0,
            bytes_processed: 0,
            finished: false,
        })
    }

    /// The chunked file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// SHA-256 of the whole input file.
    pub fn file_hash(&self) -> Sha256Digest {
        self.file_hash
    }

    /// Total input size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of chunks the file will produce.
    pub fn total_chunks(&self) -> u32 {
        self.total_size.div_ceil(self.chunk_size) as u32
    }

    /// `(chunks_emitted, bytes_emitted)` so far.
    pub fn progress(&self) -> (u32, u64) {
        (self.next_sequence, self.bytes_processed)
    }

    /// Produce the next chunk, or `None` after the last one.
    pub async fn next_chunk(&mut self) -> Result<Option<ChunkPayload>, CasError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size as usize];
        let mut filled = 0usize;

        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finished = true;
            return Ok(None);
        }
        buf.truncate(filled);

        let sequence = self.next_sequence;
        let chunk = Chunk {
            id: generate_chunk_id(sequence, &self.file_hash),
            sequence_number: sequence,
            size: filled as u64,
            created_timestamp: now_secs(),
            hash: hash::sha256(&buf),
            locations: Vec::new(),
        };

        self.next_sequence += 1;
        self.bytes_processed += filled as u64;
        if self.bytes_processed >= self.total_size {
            self.finished = true;
        }

        Ok(Some(ChunkPayload {
            chunk,
            data: Bytes::from(buf),
        }))
    }
}

/// Build a chunk id from the sequence number, a file-hash prefix, and
/// random bytes, truncated to [`CHUNK_ID_LEN`] characters.
///
/// Ids are unique within one file; they are not integrity oracles and
/// carry no global-uniqueness guarantee.
pub fn generate_chunk_id(sequence: u32, file_hash: &Sha256Digest) -> String {
    let random: [u8; 6] = rand::thread_rng().gen();
    let fh = file_hash.as_bytes();
    let mut id = format!(
        "{sequence:08x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        fh[0], fh[1], random[0], random[1], random[2], random[3], random[4], random[5],
    );
    id.truncate(CHUNK_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn write_temp(data: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        tokio::fs::write(&path, data).await.unwrap();
        (dir, path)
    }

    async fn collect(chunker: &mut FileChunker) -> Vec<ChunkPayload> {
        let mut out = Vec::new();
        while let Some(payload) = chunker.next_chunk().await.unwrap() {
            out.push(payload);
        }
        out
    }

    #[tokio::test]
    async fn test_exactly_chunk_size() {
        let data = vec![0xabu8; 256];
        let (_dir, path) = write_temp(&data).await;
        let mut chunker = FileChunker::open(&path, 256).await.unwrap();
        assert_eq!(chunker.total_chunks(), 1);

        let chunks = collect(&mut chunker).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data.as_ref(), &data[..]);
        assert_eq!(chunks[0].chunk.sequence_number, 0);
        assert_eq!(chunks[0].chunk.size, 256);
    }

    #[tokio::test]
    async fn test_chunk_size_plus_one() {
        let data = vec![0xcdu8; 257];
        let (_dir, path) = write_temp(&data).await;
        let mut chunker = FileChunker::open(&path, 256).await.unwrap();
        assert_eq!(chunker.total_chunks(), 2);

        let chunks = collect(&mut chunker).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk.size, 256);
        assert_eq!(chunks[1].chunk.size, 1);
        assert_eq!(chunks[1].chunk.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_three_and_a_half_chunks() {
        let data = vec![0xffu8; 350];
        let (_dir, path) = write_temp(&data).await;
        let mut chunker = FileChunker::open(&path, 100).await.unwrap();

        let chunks = collect(&mut chunker).await;
        let sizes: Vec<u64> = chunks.iter().map(|c| c.chunk.size).collect();
        assert_eq!(sizes, vec![100, 100, 100, 50]);
        let sequences: Vec<u32> = chunks.iter().map(|c| c.chunk.sequence_number).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(chunks.iter().map(|c| c.chunk.size).sum::<u64>(), 350);
    }

    #[tokio::test]
    async fn test_chunk_hashes_match_payload() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 255) as u8).collect();
        let (_dir, path) = write_temp(&data).await;
        let mut chunker = FileChunker::open(&path, 300).await.unwrap();

        for payload in collect(&mut chunker).await {
            assert_eq!(payload.chunk.hash, hash::sha256(&payload.data));
        }
    }

    #[tokio::test]
    async fn test_file_hash_prepass() {
        let data = b"trawl chunker pre-pass".to_vec();
        let (_dir, path) = write_temp(&data).await;
        let chunker = FileChunker::open(&path, 8).await.unwrap();
        assert_eq!(chunker.file_hash(), hash::sha256(&data));
        assert_eq!(chunker.total_size(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let (_dir, path) = write_temp(b"").await;
        let err = FileChunker::open(&path, 256).await.unwrap_err();
        assert!(matches!(err, CasError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let (_dir, path) = write_temp(b"x").await;
        let err = FileChunker::open(&path, 0).await.unwrap_err();
        assert!(matches!(err, CasError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileChunker::open(&dir.path().join("nope"), 256)
            .await
            .unwrap_err();
        assert!(matches!(err, CasError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_restart_by_reopen() {
        let data = vec![0x11u8; 500];
        let (_dir, path) = write_temp(&data).await;

        let mut first = FileChunker::open(&path, 200).await.unwrap();
        let a = collect(&mut first).await;
        let mut second = FileChunker::open(&path, 200).await.unwrap();
        let b = collect(&mut second).await;

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.chunk.hash, y.chunk.hash);
            assert_eq!(x.data, y.data);
        }
    }

    #[test]
    fn test_chunk_id_shape() {
        let hash = hash::sha256(b"id shape");
        let id = generate_chunk_id(7, &hash);
        assert_eq!(id.len(), CHUNK_ID_LEN);
        assert!(id.starts_with("00000007"));
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        // The file-hash prefix follows the sequence.
        let fh = hash.as_bytes();
        assert_eq!(&id[8..12], format!("{:02x}{:02x}", fh[0], fh[1]));
    }

    #[test]
    fn test_chunk_ids_differ_across_calls() {
        let hash = hash::sha256(b"randomness");
        let a = generate_chunk_id(0, &hash);
        let b = generate_chunk_id(0, &hash);
        // Same sequence and file, different random suffix.
        assert_ne!(a, b);
        assert_eq!(a[..12], b[..12]);
    }
}
