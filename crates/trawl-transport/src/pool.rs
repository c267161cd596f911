//! The server pool: per-server slots, aggregate concurrency cap,
//! bounded retries, and the health/latency registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};
use trawl_types::{now_secs, ServerDescriptor, ServerHealth, ServerId, ServerStatus};

use crate::error::TransportError;
use crate::ftp::FtpStore;
use crate::traits::RemoteStore;

/// Tuning knobs for the pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Aggregate cap on in-flight operations across all servers.
    pub max_concurrent_operations: usize,
    /// Attempts per operation, including the first.
    pub max_attempts: u32,
    /// Base of the linear backoff between attempts.
    pub retry_base_delay: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 4,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// One configured server: its descriptor, its store, and its latest
/// health observation.
pub struct ServerSlot {
    descriptor: ServerDescriptor,
    store: Arc<dyn RemoteStore>,
    health: Mutex<ServerHealth>,
}

impl ServerSlot {
    /// The server's configuration.
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// The latest health observation.
    pub fn health(&self) -> ServerHealth {
        *self.health.lock().unwrap()
    }

    fn mark_available(&self, latency: Option<Duration>) {
        let mut health = self.health.lock().unwrap();
        health.status = ServerStatus::Available;
        health.last_checked = now_secs();
        if let Some(latency) = latency {
            health.last_latency_ms = latency.as_secs_f64() * 1000.0;
        }
    }

    fn mark_unavailable(&self) {
        let mut health = self.health.lock().unwrap();
        health.status = ServerStatus::Unavailable;
        health.last_checked = now_secs();
    }
}

/// Connection pool over all configured servers.
///
/// Within one server, operations are serialized by the store's session
/// lock; across servers, concurrency is bounded by the pool semaphore.
/// Every operation passes through the bounded retry loop with linear
/// backoff; retries are counted for operation statistics.
pub struct ServerPool {
    slots: Vec<Arc<ServerSlot>>,
    by_id: HashMap<ServerId, usize>,
    limiter: Arc<tokio::sync::Semaphore>,
    options: PoolOptions,
    retries: AtomicU64,
}

impl ServerPool {
    /// Build a pool of [`FtpStore`]s from server descriptors.
    ///
    /// `ftp_timeout` is doubled for TLS servers to cover the handshake
    /// and the slower data path.
    pub fn for_ftp(
        servers: Vec<ServerDescriptor>,
        ftp_timeout: Duration,
        verify_certs: bool,
        options: PoolOptions,
    ) -> Self {
        let stores = servers
            .into_iter()
            .map(|descriptor| {
                let timeout = if descriptor.use_ssl {
                    ftp_timeout * 2
                } else {
                    ftp_timeout
                };
                let store: Arc<dyn RemoteStore> =
                    Arc::new(FtpStore::new(descriptor.clone(), timeout, verify_certs));
                (descriptor, store)
            })
            .collect();
        Self::with_stores(stores, options)
    }

    /// Build a pool from pre-made stores. Used by tests to swap in
    /// [`MemoryStore`](crate::MemoryStore)s.
    pub fn with_stores(
        stores: Vec<(ServerDescriptor, Arc<dyn RemoteStore>)>,
        options: PoolOptions,
    ) -> Self {
        let mut slots = Vec::with_capacity(stores.len());
        let mut by_id = HashMap::new();
        for (descriptor, store) in stores {
            by_id.insert(descriptor.id.clone(), slots.len());
            slots.push(Arc::new(ServerSlot {
                descriptor,
                store,
                health: Mutex::new(ServerHealth::default()),
            }));
        }
        Self {
            slots,
            by_id,
            limiter: Arc::new(tokio::sync::Semaphore::new(
                options.max_concurrent_operations.max(1),
            )),
            options,
            retries: AtomicU64::new(0),
        }
    }

    /// Number of configured servers.
    pub fn server_count(&self) -> usize {
        self.slots.len()
    }

    /// Server ids in configuration order.
    pub fn server_ids(&self) -> Vec<ServerId> {
        self.slots
            .iter()
            .map(|slot| slot.descriptor.id.clone())
            .collect()
    }

    /// All slots in configuration order.
    pub fn slots(&self) -> &[Arc<ServerSlot>] {
        &self.slots
    }

    /// The slot for `server_id`.
    pub fn slot(&self, server_id: &ServerId) -> Result<&Arc<ServerSlot>, TransportError> {
        self.by_id
            .get(server_id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| TransportError::UnknownServer(server_id.clone()))
    }

    /// Latest health observation for `server_id`.
    pub fn health_of(&self, server_id: &ServerId) -> Result<ServerHealth, TransportError> {
        Ok(self.slot(server_id)?.health())
    }

    /// Transport retries performed since pool creation.
    pub fn retries_performed(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Run `op` against `server_id` under the concurrency cap, retrying
    /// retryable failures up to the configured attempt budget with
    /// linear backoff (`base_delay * attempt`).
    pub async fn run<T, F, Fut>(
        &self,
        server_id: &ServerId,
        op_name: &'static str,
        mut op: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut(Arc<dyn RemoteStore>) -> Fut,
        Fut: std::future::Future<Output = Result<T, TransportError>>,
    {
        let slot = self.slot(server_id)?.clone();
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| TransportError::Network("pool shut down".to_string()))?;

        let mut attempt = 1u32;
        loop {
            match op(slot.store.clone()).await {
                Ok(value) => {
                    slot.mark_available(None);
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.options.max_attempts => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        server = %server_id,
                        op = op_name,
                        attempt,
                        error = %e,
                        "transport error, retrying"
                    );
                    tokio::time::sleep(self.options.retry_base_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        // Retryable class, attempts exhausted: the server
                        // is not answering.
                        slot.mark_unavailable();
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Probe one server and record the observation.
    pub async fn ping_server(&self, server_id: &ServerId) -> Result<Duration, TransportError> {
        let slot = self.slot(server_id)?.clone();
        match slot.store.ping().await {
            Ok(latency) => {
                slot.mark_available(Some(latency));
                debug!(server = %server_id, latency_ms = latency.as_secs_f64() * 1000.0, "server probe ok");
                Ok(latency)
            }
            Err(e) => {
                slot.mark_unavailable();
                debug!(server = %server_id, error = %e, "server probe failed");
                Err(e)
            }
        }
    }

    /// Probe every server concurrently; returns per-server results in
    /// configuration order.
    pub async fn ping_all(&self) -> Vec<(ServerId, Result<Duration, TransportError>)> {
        let mut tasks = tokio::task::JoinSet::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let slot = slot.clone();
            tasks.spawn(async move {
                let result = match slot.store.ping().await {
                    Ok(latency) => {
                        slot.mark_available(Some(latency));
                        Ok(latency)
                    }
                    Err(e) => {
                        slot.mark_unavailable();
                        Err(e)
                    }
                };
                (index, slot.descriptor.id.clone(), result)
            });
        }

        let mut results: Vec<Option<(ServerId, Result<Duration, TransportError>)>> =
            (0..self.slots.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, id, result)) = joined {
                results[index] = Some((id, result));
            }
        }
        results.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::progress::TransferControl;
    use bytes::Bytes;

    fn descriptor(id: &str) -> ServerDescriptor {
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

    fn fast_options() -> PoolOptions {
        PoolOptions {
            max_concurrent_operations: 4,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn pool_of(n: usize) -> (ServerPool, Vec<Arc<MemoryStore>>) {
        let mut stores = Vec::new();
        let mut entries = Vec::new();
        for i in 1..=n {
            let store = Arc::new(MemoryStore::new());
            stores.push(store.clone());
            entries.push((
                descriptor(&format!("s{i}")),
                store as Arc<dyn RemoteStore>,
            ));
        }
        (ServerPool::with_stores(entries, fast_options()), stores)
    }

    #[tokio::test]
    async fn test_run_success_marks_available() {
        let (pool, _stores) = pool_of(1);
        let id = ServerId::from("s1");
        pool.run(&id, "upload", |store| {
            let ctl = TransferControl::none();
            async move { store.upload("x", Bytes::from_static(b"a"), &ctl).await }
        })
        .await
        .unwrap();

        assert_eq!(pool.health_of(&id).unwrap().status, ServerStatus::Available);
        assert_eq!(pool.retries_performed(), 0);
    }

    #[tokio::test]
    async fn test_run_retries_transient_failures() {
        let (pool, stores) = pool_of(1);
        stores[0].fail_uploads(2);
        let id = ServerId::from("s1");
        pool.run(&id, "upload", |store| {
            let ctl = TransferControl::none();
            async move { store.upload("x", Bytes::from_static(b"a"), &ctl).await }
        })
        .await
        .unwrap();

        assert_eq!(pool.retries_performed(), 2);
        assert_eq!(stores[0].upload_count(), 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts_and_marks_unavailable() {
        let (pool, stores) = pool_of(1);
        stores[0].set_offline(true);
        let id = ServerId::from("s1");
        let err = pool
            .run(&id, "ping", |store| async move { store.ping().await })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(pool.retries_performed(), 2);
        assert_eq!(
            pool.health_of(&id).unwrap().status,
            ServerStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn test_run_does_not_retry_fatal_errors() {
        let (pool, _stores) = pool_of(1);
        let id = ServerId::from("s1");
        let err = pool
            .run(&id, "download", |store| {
                let ctl = TransferControl::none();
                async move { store.download("missing", &ctl).await }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::NotFound(_)));
        assert_eq!(pool.retries_performed(), 0);
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let (pool, _stores) = pool_of(1);
        let err = pool
            .run(&ServerId::from("ghost"), "ping", |store| async move {
                store.ping().await
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownServer(_)));
    }

    #[tokio::test]
    async fn test_ping_all_updates_registry() {
        let (pool, stores) = pool_of(3);
        stores[1].set_offline(true);

        let results = pool.ping_all().await;
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());

        assert_eq!(
            pool.health_of(&ServerId::from("s2")).unwrap().status,
            ServerStatus::Unavailable
        );
        let healthy = pool
            .slots()
            .iter()
            .filter(|slot| slot.health().is_usable())
            .count();
        assert_eq!(healthy, 2);
    }
}
