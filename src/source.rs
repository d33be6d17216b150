//! Data source boundary.
//!
//! The cache never invents data: every value comes from a [`DataSource`]
//! implementation, which decides the expiry of each result and whether an
//! expired copy should be kept for backoff-serving or removed outright.

use crate::error::{Error, Result};
use crate::types::{CacheKey, CacheValue, TimedValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Upstream mutation applied by [`DataSource::modify`].
///
/// Receives the current upstream value (if any) and returns the new one.
pub type ValueModifier<V> = Box<dyn FnOnce(Option<V>) -> V + Send + 'static>;

/// The external collaborator the cache refreshes from.
///
/// Only [`fetch`](DataSource::fetch) is required; the remaining hooks have
/// sensible defaults.
#[async_trait]
pub trait DataSource<K, V>: Send + Sync + 'static
where
    K: CacheKey,
    V: CacheValue,
{
    /// Fetch the current value for a key.
    ///
    /// `Ok(None)` means the key has no data; this is terminal and is never
    /// cached. `Err` is a transient failure: the cache serves stale data when
    /// it has any and retries per backoff.
    async fn fetch(&self, key: &K) -> Result<Option<TimedValue<V>>>;

    /// Bulk warm-start called once per worker before it starts serving.
    async fn init(&self, _keys: &[K]) -> HashMap<K, TimedValue<V>> {
        HashMap::new()
    }

    /// Apply a mutation upstream and return the resulting value.
    async fn modify(&self, _key: &K, _modifier: ValueModifier<V>) -> Result<Option<TimedValue<V>>> {
        Err(Error::ModifyUnsupported)
    }

    /// Fire-and-forget hook invoked after an entry is marked dirty.
    fn after_dirty_marked(&self, _key: &K) {}

    /// Whether the auto-update sweep should pre-warm this expired entry.
    fn auto_refresh(&self, _key: &K, _value: &V) -> bool {
        false
    }

    /// Per-key idle eviction override. `None` falls back to the
    /// configuration-wide idle timeout.
    fn idle_timeout(&self, _key: &K) -> Option<Duration> {
        None
    }
}
