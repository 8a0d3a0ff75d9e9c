//! Bounded client pool
//!
//! Caches one storage client handle per bucket. Handles are created lazily
//! on first use; when the pool is full the oldest-inserted handle is evicted
//! (insertion order, not access order) and becomes garbage-eligible once its
//! last caller drops it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::client::{LocalClient, ObjectClient, RemoteClient};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// Default maximum number of resident client handles.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

struct PoolInner {
    clients: HashMap<String, Arc<dyn ObjectClient>>,
    /// Insertion order for eviction.
    order: VecDeque<String>,
}

/// Bounded per-bucket cache of storage client handles.
///
/// The backend variant (remote or local) is decided once, when the entry is
/// created; an existing handle is returned as-is regardless of later
/// configuration drift.
pub struct ClientPool {
    config: StorageConfig,
    max_clients: usize,
    inner: Mutex<PoolInner>,
}

impl ClientPool {
    pub fn new(config: StorageConfig) -> Self {
        Self::with_capacity(config, DEFAULT_MAX_CLIENTS)
    }

    pub fn with_capacity(config: StorageConfig, max_clients: usize) -> Self {
        Self {
            config,
            max_clients: max_clients.max(1),
            inner: Mutex::new(PoolInner {
                clients: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Resolve the client handle for `bucket`, creating it on first use.
    ///
    /// Client construction performs I/O and runs outside the pool lock; the
    /// membership check and insert are each a single atomic critical
    /// section, with a re-check on insert so concurrent first users of the
    /// same bucket converge on one handle.
    pub async fn get(&self, bucket: &str) -> Result<Arc<dyn ObjectClient>> {
        if let Some(existing) = self.inner.lock().clients.get(bucket) {
            return Ok(Arc::clone(existing));
        }

        let created = self.create_client(bucket).await?;

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.clients.get(bucket) {
            // Another caller won the race while we were constructing.
            return Ok(Arc::clone(existing));
        }

        if inner.clients.len() >= self.max_clients {
            if let Some(oldest) = inner.order.pop_front() {
                inner.clients.remove(&oldest);
                info!(bucket = %oldest, "evicted oldest client handle from pool");
            }
        }

        inner.clients.insert(bucket.to_string(), Arc::clone(&created));
        inner.order.push_back(bucket.to_string());
        debug!(
            bucket = bucket,
            resident = inner.clients.len(),
            "created storage client"
        );
        Ok(created)
    }

    async fn create_client(&self, bucket: &str) -> Result<Arc<dyn ObjectClient>> {
        if self.config.is_local_bucket(bucket) {
            if !self.config.local.enabled {
                return Err(StorageError::Config(format!(
                    "local storage is disabled, cannot serve bucket {}",
                    bucket
                )));
            }
            let client = LocalClient::new(&self.config.local.base_path, bucket).await?;
            Ok(Arc::new(client))
        } else {
            let remote = self.config.remote.as_ref().ok_or_else(|| {
                StorageError::Config(format!("no remote endpoint configured for bucket {}", bucket))
            })?;
            let client = RemoteClient::connect(remote, bucket).await?;
            Ok(Arc::new(client))
        }
    }

    /// Number of resident handles.
    pub fn len(&self) -> usize {
        self.inner.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configuration the pool resolves buckets against.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;
    use tempfile::TempDir;

    fn local_only_config(dir: &TempDir) -> StorageConfig {
        StorageConfig {
            remote: None,
            local: LocalConfig {
                enabled: true,
                base_path: dir.path().to_path_buf(),
            },
            buckets: Vec::new(),
            default_bucket: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn test_handle_reused_for_same_bucket() {
        let dir = TempDir::new().unwrap();
        let pool = ClientPool::new(local_only_config(&dir));

        let a = pool.get("photos").await.unwrap();
        let b = pool.get("photos").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_pool_bound_evicts_oldest_inserted() {
        let dir = TempDir::new().unwrap();
        let pool = ClientPool::with_capacity(local_only_config(&dir), 3);

        let first = pool.get("b0").await.unwrap();
        for i in 1..=3 {
            pool.get(&format!("b{}", i)).await.unwrap();
        }
        assert_eq!(pool.len(), 3);

        // "b0" was the oldest insert; a fresh get creates a new handle.
        let replacement = pool.get("b0").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &replacement));
    }

    #[tokio::test]
    async fn test_local_disabled_rejects_local_bucket() {
        let dir = TempDir::new().unwrap();
        let mut config = local_only_config(&dir);
        config.local.enabled = false;

        let pool = ClientPool::new(config);
        assert!(matches!(
            pool.get("local").await,
            Err(StorageError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_variant_selection_is_tagged() {
        let dir = TempDir::new().unwrap();
        let pool = ClientPool::new(local_only_config(&dir));
        let client = pool.get("anything").await.unwrap();
        assert_eq!(client.kind(), crate::client::ClientKind::Local);
    }
}
