//! Shared fixtures: a pool of memory-backed servers plus a scratch
//! directory for local files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use trawl_transport::{MemoryStore, PoolOptions, RemoteStore, ServerPool};
use trawl_types::{ServerDescriptor, ServerId};

use crate::{EngineConfig, TrawlEngine};

pub const MIB: u64 = 1024 * 1024;

pub struct Harness {
    pub engine: TrawlEngine,
    pub pool: Arc<ServerPool>,
    pub stores: Vec<Arc<MemoryStore>>,
    pub dir: tempfile::TempDir,
}

pub fn descriptor(id: &str) -> ServerDescriptor {
    ServerDescriptor {
        id: ServerId::from(id),
        host: format!("{id}.test"),
        port: 21,
        username: "u".into(),
        password: "p".into(),
        base_path: "/data".into(),
        use_ssl: false,
        passive_mode: true,
        priority: 0,
    }
}

/// Build an engine over `servers` memory stores.
pub fn harness(servers: usize, replication_factor: u32, chunk_size: u64) -> Harness {
    let mut stores = Vec::new();
    let mut entries = Vec::new();
    for i in 1..=servers {
        let store = Arc::new(MemoryStore::new());
        stores.push(store.clone());
        entries.push((descriptor(&format!("s{i}")), store as Arc<dyn RemoteStore>));
    }
    let options = PoolOptions {
        retry_base_delay: Duration::from_millis(1),
        ..PoolOptions::default()
    };
    let pool = Arc::new(ServerPool::with_stores(entries, options));
    let engine = TrawlEngine::new(
        pool.clone(),
        EngineConfig {
            chunk_size,
            replication_factor,
            always_verify_integrity: true,
        },
    );
    Harness {
        engine,
        pool,
        stores,
        dir: tempfile::tempdir().unwrap(),
    }
}

impl Harness {
    /// Write `data` into the scratch directory and return its path.
    pub async fn write_input(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    /// Scratch path for a download target.
    pub fn out_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Deterministic pseudo-random content.
pub fn file_bytes(len: u64) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(37) % 249) as u8).collect()
}
