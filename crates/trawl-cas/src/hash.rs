//! SHA-256 over byte slices and files.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use trawl_types::Sha256Digest;

use crate::error::CasError;

/// Read buffer for streaming file hashes: 64 KiB.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 of a byte slice.
pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Sha256Digest::from_bytes(hasher.finalize().into())
}

/// SHA-256 of a file's contents, streamed in [`READ_BUFFER_SIZE`] reads.
///
/// Returns the digest together with the byte count actually hashed.
pub async fn sha256_file(path: &Path) -> Result<(Sha256Digest, u64), CasError> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CasError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(CasError::Io(e)),
    };

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((Sha256Digest::from_bytes(hasher.finalize().into()), total))
}
