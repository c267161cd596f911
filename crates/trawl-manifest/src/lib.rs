//! Manifest codec and local persistence.
//!
//! A manifest is the durable JSON placement map of one stored file (see
//! [`trawl_types::FileManifest`]). This crate builds manifests, validates
//! their invariants, converts them to and from JSON, and persists them
//! locally with atomic replacement and timestamped backups.

mod codec;
mod error;
mod store;

pub use codec::{build_manifest, from_json, generate_manifest_id, to_json, validate};
pub use error::ManifestError;
pub use store::ManifestStore;
