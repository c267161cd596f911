//! Content addressing for trawl: SHA-256 hashing and the file chunker.
//!
//! The chunker splits an input file into fixed-size, sequence-numbered,
//! content-hashed chunks. The whole-file hash is computed in a pre-pass
//! so the manifest can be initialized before the first chunk is emitted.

mod chunker;
mod error;
pub mod hash;

pub use chunker::{generate_chunk_id, ChunkPayload, FileChunker};
pub use error::CasError;
