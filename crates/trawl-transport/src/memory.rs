//! In-memory [`RemoteStore`] for tests.
//!
//! Behaves like a tiny FTP server rooted at `/`: flat path→bytes map,
//! rename, directory listing by prefix. Fault injection knobs let tests
//! take the server offline, fail a number of uploads, or corrupt a
//! stored replica in place.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportError;
use crate::progress::TransferControl;
use crate::traits::RemoteStore;

#[derive(Default)]
struct Inner {
    files: HashMap<String, Bytes>,
    offline: bool,
    uploads_to_fail: u32,
    downloads_to_fail: u32,
    upload_count: u64,
}

/// Volatile store with fault injection, for exercising the pipeline
/// without real servers.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the server going down (every call fails with a network
    /// error) or coming back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Make the next `n` uploads fail with a network error.
    pub fn fail_uploads(&self, n: u32) {
        self.inner.lock().unwrap().uploads_to_fail = n;
    }

    /// Make the next `n` downloads fail with a network error.
    pub fn fail_downloads(&self, n: u32) {
        self.inner.lock().unwrap().downloads_to_fail = n;
    }

    /// Flip one byte of the file at `path`. Panics if absent or empty.
    pub fn corrupt(&self, path: &str, offset: usize) {
        let mut inner = self.inner.lock().unwrap();
        let data = inner.files.get(path).expect("no such file to corrupt");
        let mut bytes = data.to_vec();
        let i = offset % bytes.len();
        bytes[i] ^= 0xff;
        inner.files.insert(path.to_string(), Bytes::from(bytes));
    }

    /// Raw contents of `path`, if present.
    pub fn raw(&self, path: &str) -> Option<Bytes> {
        self.inner.lock().unwrap().files.get(path).cloned()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.lock().unwrap().files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }

    /// Total uploads attempted against this store.
    pub fn upload_count(&self) -> u64 {
        self.inner.lock().unwrap().upload_count
    }

    fn check_online(inner: &Inner) -> Result<(), TransportError> {
        if inner.offline {
            Err(TransportError::Network("server offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn key(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        ctl: &TransferControl,
    ) -> Result<(), TransportError> {
        if ctl.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.upload_count += 1;
        Self::check_online(&inner)?;
        if inner.uploads_to_fail > 0 {
            inner.uploads_to_fail -= 1;
            return Err(TransportError::Network("injected upload failure".into()));
        }
        ctl.report(data.len() as u64, data.len() as u64);
        inner.files.insert(Self::key(path), data);
        Ok(())
    }

    async fn download(&self, path: &str, ctl: &TransferControl) -> Result<Bytes, TransportError> {
        if ctl.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let mut inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        if inner.downloads_to_fail > 0 {
            inner.downloads_to_fail -= 1;
            return Err(TransportError::Network("injected download failure".into()));
        }
        let data = inner
            .files
            .get(&Self::key(path))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(path.to_string()))?;
        ctl.report(data.len() as u64, data.len() as u64);
        Ok(data)
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        inner
            .files
            .remove(&Self::key(path))
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        let inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        Ok(inner.files.contains_key(&Self::key(path)))
    }

    async fn size(&self, path: &str) -> Result<u64, TransportError> {
        let inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        inner
            .files
            .get(&Self::key(path))
            .map(|data| data.len() as u64)
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    async fn mkdir(&self, _path: &str) -> Result<(), TransportError> {
        let inner = self.inner.lock().unwrap();
        Self::check_online(&inner)
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        let prefix = format!("{}/", Self::key(path).trim_end_matches('/'));
        let mut names: Vec<String> = inner
            .files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        let data = inner
            .files
            .remove(&Self::key(from))
            .ok_or_else(|| TransportError::NotFound(from.to_string()))?;
        inner.files.insert(Self::key(to), data);
        Ok(())
    }

    async fn ping(&self) -> Result<Duration, TransportError> {
        let inner = self.inner.lock().unwrap();
        Self::check_online(&inner)?;
        Ok(Duration::from_millis(1))
    }
}
