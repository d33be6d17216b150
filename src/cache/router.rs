//! Consistent routing of keys onto the worker pool.
//!
//! A pool is a fixed set of workers; each key hashes to exactly one of them,
//! so all traffic for a key serializes through a single worker's inbox.

use crate::cache::{CacheMsg, CacheWorker, RefreshOutcome, Responder};
use crate::cluster::{ClusterTransport, ClusterView};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::source::{DataSource, ValueModifier};
use crate::types::{CacheKey, CacheStats, CacheValue, SyncUpdate, TimedValue};
use std::hash::Hasher;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use twox_hash::XxHash64;

/// Hash seed shared by every node so that routing agrees cluster-wide.
const HASH_SEED: u64 = 0;

/// Routes requests to the fixed pool of single-writer workers.
pub struct ShardRouter<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    config: Arc<CacheConfig>,
    workers: Vec<mpsc::Sender<CacheMsg<K, V>>>,
}

impl<K, V> ShardRouter<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Spawn the worker pool. `init_keys` are partitioned by the same hash
    /// as requests and warm-loaded through [`DataSource::init`] before each
    /// worker starts serving.
    pub fn new(
        config: CacheConfig,
        source: Arc<dyn DataSource<K, V>>,
        transport: Arc<dyn ClusterTransport<K, V>>,
        init_keys: Vec<K>,
    ) -> Self {
        let config = Arc::new(config);
        let workers = config.workers;

        let mut partitions: Vec<Vec<K>> = (0..workers).map(|_| Vec::new()).collect();
        for key in init_keys {
            let slot = hash_slot(&key, workers);
            partitions[slot].push(key);
        }

        let workers = partitions
            .into_iter()
            .map(|keys| {
                let gateway = crate::cluster::LeaderGateway::new(&config, transport.clone());
                CacheWorker::spawn(config.clone(), source.clone(), gateway, keys)
            })
            .collect();

        Self { config, workers }
    }

    /// The cache's configured name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configured per-request client timeout.
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }

    fn worker(&self, key: &K) -> &mpsc::Sender<CacheMsg<K, V>> {
        &self.workers[hash_slot(key, self.workers.len())]
    }

    async fn send(&self, key: &K, msg: CacheMsg<K, V>) -> Result<()> {
        self.worker(key)
            .send(msg)
            .await
            .map_err(|_| Error::WorkerClosed)
    }

    /// Get the value for a key.
    pub async fn get(&self, key: K) -> Result<V> {
        let (tx, rx) = oneshot::channel();
        self.send(
            &key,
            CacheMsg::Get {
                key: key.clone(),
                responder: Responder::Value(tx),
            },
        )
        .await?;
        rx.await.map_err(|_| Error::WorkerClosed)?
    }

    /// Get the value together with its expiry. This is what serves
    /// leader-forwarded requests, whose reply must carry the freshness
    /// metadata for the follower's monotonic apply.
    pub async fn get_timed(&self, key: K) -> Result<TimedValue<V>> {
        let (tx, rx) = oneshot::channel();
        self.send(
            &key,
            CacheMsg::Get {
                key: key.clone(),
                responder: Responder::Timed(tx),
            },
        )
        .await?;
        rx.await.map_err(|_| Error::WorkerClosed)?
    }

    /// Get a sub-slice of a list-typed value.
    pub async fn get_range(&self, key: K, start: usize, count: usize) -> Result<V> {
        let (tx, rx) = oneshot::channel();
        self.send(
            &key,
            CacheMsg::Get {
                key: key.clone(),
                responder: Responder::Range { start, count, tx },
            },
        )
        .await?;
        rx.await.map_err(|_| Error::WorkerClosed)?
    }

    /// Get the element count of a list-typed value.
    pub async fn get_size(&self, key: K) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(
            &key,
            CacheMsg::Get {
                key: key.clone(),
                responder: Responder::Size(tx),
            },
        )
        .await?;
        rx.await.map_err(|_| Error::WorkerClosed)?
    }

    /// Run a modification through the data source and cache its result.
    /// Returns the post-modification value.
    pub async fn modify(&self, key: K, modifier: ValueModifier<V>) -> Result<V> {
        let (tx, rx) = oneshot::channel();
        self.send(
            &key,
            CacheMsg::Modify {
                key: key.clone(),
                modifier,
                responder: Responder::Value(tx),
            },
        )
        .await?;
        rx.await.map_err(|_| Error::WorkerClosed)?
    }

    /// Force a key's entry to expire so the next read refreshes it.
    pub async fn mark_dirty(&self, key: K) -> Result<()> {
        self.send(&key.clone(), CacheMsg::MarkDirty { key }).await
    }

    /// Apply an update pushed by another node. Routed like any other message
    /// so the owning worker's monotonic-freshness check arbitrates it.
    pub async fn apply_sync(&self, update: SyncUpdate<K, V>) -> Result<()> {
        let key = update.key.clone();
        self.send(
            &key,
            CacheMsg::Refreshed {
                key: update.key,
                outcome: RefreshOutcome::Fetched(update.value),
                sync: update.sync,
                responder: Responder::None,
            },
        )
        .await
    }

    /// Fan a new cluster view out to every worker.
    pub async fn update_cluster_view(&self, view: ClusterView) -> Result<()> {
        for worker in &self.workers {
            worker
                .send(CacheMsg::ClusterViewChanged(view.clone()))
                .await
                .map_err(|_| Error::WorkerClosed)?;
        }
        Ok(())
    }

    /// Aggregate statistics across the pool.
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut total = CacheStats::default();
        for worker in &self.workers {
            let (tx, rx) = oneshot::channel();
            worker
                .send(CacheMsg::Stats(tx))
                .await
                .map_err(|_| Error::WorkerClosed)?;
            let stats = rx.await.map_err(|_| Error::WorkerClosed)?;
            total.merge(&stats);
        }
        Ok(total)
    }
}

/// Map a key to its worker slot. Deterministic across restarts and nodes.
fn hash_slot<K: CacheKey>(key: &K, slots: usize) -> usize {
    let mut hasher = XxHash64::with_seed(HASH_SEED);
    std::hash::Hash::hash(key, &mut hasher);
    (hasher.finish() % slots as u64) as usize
}
