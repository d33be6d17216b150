//! Time-bounded client handle over a worker pool.
//!
//! The client only bounds how long a caller waits; an in-flight refresh is
//! never cancelled by a caller giving up, so its result still lands in the
//! cache for the next request.

use crate::cache::router::ShardRouter;
use crate::error::{Error, Result};
use crate::source::ValueModifier;
use crate::types::{CacheKey, CacheStats, CacheValue, TimedValue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cheaply cloneable handle for issuing cache requests.
#[derive(Clone)]
pub struct CacheClient<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    router: Arc<ShardRouter<K, V>>,
    timeout: Duration,
}

impl<K, V> CacheClient<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Wrap a router, taking the wait bound from its configuration.
    pub fn new(router: Arc<ShardRouter<K, V>>) -> Self {
        let timeout = router.request_timeout();
        Self { router, timeout }
    }

    /// Wrap a router with an explicit wait bound.
    pub fn with_timeout(router: Arc<ShardRouter<K, V>>, timeout: Duration) -> Self {
        Self { router, timeout }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Get the value for a key.
    pub async fn get(&self, key: K) -> Result<V> {
        self.bounded(self.router.get(key)).await
    }

    /// Get the value together with its expiry.
    pub async fn get_timed(&self, key: K) -> Result<TimedValue<V>> {
        self.bounded(self.router.get_timed(key)).await
    }

    /// Get a sub-slice of a list-typed value.
    pub async fn get_range(&self, key: K, start: usize, count: usize) -> Result<V> {
        self.bounded(self.router.get_range(key, start, count)).await
    }

    /// Get the element count of a list-typed value.
    pub async fn get_size(&self, key: K) -> Result<usize> {
        self.bounded(self.router.get_size(key)).await
    }

    /// Run a modification through the data source; returns the new value.
    pub async fn modify(&self, key: K, modifier: ValueModifier<V>) -> Result<V> {
        self.bounded(self.router.modify(key, modifier)).await
    }

    /// Force a key's entry to expire.
    pub async fn mark_dirty(&self, key: K) -> Result<()> {
        self.bounded(self.router.mark_dirty(key)).await
    }

    /// Aggregate statistics across the pool.
    pub async fn stats(&self) -> Result<CacheStats> {
        self.bounded(self.router.stats()).await
    }
}
