//! Local manifest persistence.
//!
//! Manifests are kept as `<name>.manifest` JSON files in one directory.
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! reader only ever sees the pre- or post-image. When backups are
//! enabled, the previous content of an overwritten or deleted manifest
//! is kept as `<name>.manifest.backup.<unix_ts>`, pruned to the most
//! recent `max_backups`.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use trawl_types::{now_secs, FileManifest, MANIFEST_EXTENSION};

use crate::codec;
use crate::error::ManifestError;

/// Default number of retained backups per manifest.
const DEFAULT_MAX_BACKUPS: usize = 5;

/// Directory-backed manifest store with atomic replacement.
pub struct ManifestStore {
    directory: PathBuf,
    auto_backup: bool,
    max_backups: usize,
}

impl ManifestStore {
    /// Open (creating if needed) a manifest store rooted at `directory`.
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self {
            directory,
            auto_backup: true,
            max_backups: DEFAULT_MAX_BACKUPS,
        })
    }

    /// Disable or re-enable pre-write backups.
    pub fn with_backups(mut self, enabled: bool, max_backups: usize) -> Self {
        self.auto_backup = enabled;
        self.max_backups = max_backups.max(1);
        self
    }

    /// Full path of the manifest file for `name`.
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}{MANIFEST_EXTENSION}"))
    }

    /// Persist a manifest under `name`, atomically.
    pub async fn save(&self, name: &str, manifest: &FileManifest) -> Result<(), ManifestError> {
        codec::validate(manifest)?;
        let path = self.manifest_path(name);

        if self.auto_backup && tokio::fs::try_exists(&path).await? {
            self.backup(name).await?;
        }

        let json = codec::to_json(manifest)?;
        let tmp = path.with_extension("manifest.tmp");
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &path).await?;

        debug!(name, path = %path.display(), "manifest saved");
        self.prune_backups(name).await;
        Ok(())
    }

    /// Load and validate the manifest stored under `name`.
    pub async fn load(&self, name: &str) -> Result<FileManifest, ManifestError> {
        let path = self.manifest_path(name);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(name.to_string()));
            }
            Err(e) => return Err(ManifestError::Io(e)),
        };
        codec::from_json(&json)
    }

    /// Whether a manifest exists under `name`.
    pub async fn exists(&self, name: &str) -> Result<bool, ManifestError> {
        Ok(tokio::fs::try_exists(&self.manifest_path(name)).await?)
    }

    /// Delete the manifest stored under `name` (backing it up first).
    pub async fn delete(&self, name: &str) -> Result<(), ManifestError> {
        let path = self.manifest_path(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(ManifestError::NotFound(name.to_string()));
        }
        if self.auto_backup {
            self.backup(name).await?;
        }
        tokio::fs::remove_file(&path).await?;
        debug!(name, "manifest deleted");
        Ok(())
    }

    /// Names of all manifests in the store.
    pub async fn list(&self) -> Result<Vec<String>, ManifestError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_suffix(MANIFEST_EXTENSION))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copy the current content of `name` to a timestamped backup file.
    pub async fn backup(&self, name: &str) -> Result<(), ManifestError> {
        let path = self.manifest_path(name);
        let backup = self
            .directory
            .join(format!("{name}{MANIFEST_EXTENSION}.backup.{}", now_secs()));
        tokio::fs::copy(&path, &backup).await?;
        debug!(name, backup = %backup.display(), "manifest backed up");
        Ok(())
    }

    /// Timestamps of available backups for `name`, newest first.
    pub async fn list_backups(&self, name: &str) -> Result<Vec<u64>, ManifestError> {
        let prefix = format!("{name}{MANIFEST_EXTENSION}.backup.");
        let mut timestamps = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(ts) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|ts| ts.parse::<u64>().ok())
            {
                timestamps.push(ts);
            }
        }
        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        Ok(timestamps)
    }

    /// Restore `name` from the backup at `timestamp` (or the newest when
    /// `None`).
    pub async fn restore_backup(
        &self,
        name: &str,
        timestamp: Option<u64>,
    ) -> Result<(), ManifestError> {
        let ts = match timestamp {
            Some(ts) => ts,
            None => self
                .list_backups(name)
                .await?
                .first()
                .copied()
                .ok_or_else(|| ManifestError::NotFound(format!("{name} (no backups)")))?,
        };
        let backup = self
            .directory
            .join(format!("{name}{MANIFEST_EXTENSION}.backup.{ts}"));
        if !tokio::fs::try_exists(&backup).await? {
            return Err(ManifestError::NotFound(format!("{name} backup {ts}")));
        }

        // Restore through the same tmp+rename door as a normal save.
        let path = self.manifest_path(name);
        let tmp = path.with_extension("manifest.tmp");
        tokio::fs::copy(&backup, &tmp).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Drop all but the `max_backups` most recent backups of `name`.
    async fn prune_backups(&self, name: &str) {
        let timestamps = match self.list_backups(name).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(name, error = %e, "failed to enumerate manifest backups");
                return;
            }
        };
        for ts in timestamps.iter().skip(self.max_backups) {
            let path = self
                .directory
                .join(format!("{name}{MANIFEST_EXTENSION}.backup.{ts}"));
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(name, ts, error = %e, "failed to prune manifest backup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_types::Sha256Digest;

    fn sample(name: &str, comment: &str) -> FileManifest {
        let chunk_size = 4 * 1024 * 1024u64;
        let mut m = crate::codec::build_manifest(
            name,
            chunk_size,
            chunk_size,
            Sha256Digest::from_bytes([7u8; 32]),
            3,
        );
        m.chunks = vec![trawl_types::Chunk {
            id: "00000000aabbccdd".to_string(),
            sequence_number: 0,
            size: chunk_size,
            created_timestamp: 1_700_000_000,
            hash: Sha256Digest::from_bytes([1u8; 32]),
            locations: Vec::new(),
        }];
        m.comment = comment.to_string();
        m
    }

    async fn make_store() -> (ManifestStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (store, _dir) = make_store().await;
        let manifest = sample("doc", "v1");
        store.save("doc", &manifest).await.unwrap();
        let loaded = store.load("doc").await.unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let (store, _dir) = make_store().await;
        assert!(matches!(
            store.load("absent").await,
            Err(ManifestError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_behind() {
        let (store, dir) = make_store().await;
        store.save("doc", &sample("doc", "")).await.unwrap();
        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftover.is_empty(), "tmp file survived rename");
    }

    #[tokio::test]
    async fn test_overwrite_creates_backup() {
        let (store, _dir) = make_store().await;
        store.save("doc", &sample("doc", "v1")).await.unwrap();
        store.save("doc", &sample("doc", "v2")).await.unwrap();

        let backups = store.list_backups("doc").await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(store.load("doc").await.unwrap().comment, "v2");
    }

    #[tokio::test]
    async fn test_restore_latest_backup() {
        let (store, _dir) = make_store().await;
        store.save("doc", &sample("doc", "v1")).await.unwrap();
        store.save("doc", &sample("doc", "v2")).await.unwrap();

        store.restore_backup("doc", None).await.unwrap();
        assert_eq!(store.load("doc").await.unwrap().comment, "v1");
    }

    #[tokio::test]
    async fn test_backup_retention() {
        let (store, _dir) = make_store().await;
        let store = store.with_backups(true, 2);
        // Backups are timestamped at second granularity; identical
        // timestamps overwrite, so retention can only be checked by count.
        for i in 0..5 {
            store
                .save("doc", &sample("doc", &format!("v{i}")))
                .await
                .unwrap();
        }
        let backups = store.list_backups("doc").await.unwrap();
        assert!(backups.len() <= 2, "retention left {} backups", backups.len());
    }

    #[tokio::test]
    async fn test_delete_removes_and_backs_up() {
        let (store, _dir) = make_store().await;
        store.save("doc", &sample("doc", "v1")).await.unwrap();
        store.delete("doc").await.unwrap();

        assert!(!store.exists("doc").await.unwrap());
        assert!(!store.list_backups("doc").await.unwrap().is_empty());
        assert!(matches!(
            store.delete("doc").await,
            Err(ManifestError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_names() {
        let (store, _dir) = make_store().await;
        store.save("beta", &sample("beta", "")).await.unwrap();
        store.save("alpha", &sample("alpha", "")).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_manifest() {
        let (store, _dir) = make_store().await;
        let mut manifest = sample("doc", "");
        manifest.chunk_count = 42;
        assert!(matches!(
            store.save("doc", &manifest).await,
            Err(ManifestError::Corrupt(_))
        ));
        assert!(!store.exists("doc").await.unwrap());
    }
}
