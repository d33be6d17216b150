//! Core types used throughout the cache.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Bound for cache keys.
///
/// Blanket-implemented for every type that satisfies the constraints, so user
/// code never has to implement it by hand.
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T: Hash + Eq + Clone + Debug + Send + Sync + 'static> CacheKey for T {}

/// Bound for cached values, with optional list-shaping hooks.
///
/// The default implementations mark the value as not list-typed, which makes
/// range and size requests against it fail with a shape error. `Vec<T>`
/// overrides both hooks.
pub trait CacheValue: Clone + Send + Sync + 'static {
    /// Return a copy of the `[start, start + count)` slice of a list-typed
    /// value, or `None` if the value is not a list.
    fn slice_range(&self, _start: usize, _count: usize) -> Option<Self> {
        None
    }

    /// Return the element count of a list-typed value, or `None` if the value
    /// is not a list.
    fn list_len(&self) -> Option<usize> {
        None
    }
}

impl<T: Clone + Send + Sync + 'static> CacheValue for Vec<T> {
    fn slice_range(&self, start: usize, count: usize) -> Option<Self> {
        let len = self.len();
        if start >= len {
            // A range entirely past the end yields an empty list, not an error.
            return Some(Vec::new());
        }
        let end = len.min(start.saturating_add(count));
        Some(self[start..end].to_vec())
    }

    fn list_len(&self) -> Option<usize> {
        Some(self.len())
    }
}

macro_rules! scalar_cache_value {
    ($($t:ty),* $(,)?) => {
        $(impl CacheValue for $t {})*
    };
}

scalar_cache_value!(String, &'static str, bool, i32, i64, u32, u64, f32, f64);

/// A value fetched from the data source together with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedValue<V> {
    /// The payload.
    pub value: V,

    /// Timestamp (epoch ms) after which the value is considered stale.
    pub expires_at: u64,

    /// If true, an expired copy is deleted outright by the cleanup sweep
    /// instead of being kept around for backoff-serving.
    pub remove_on_expired: bool,
}

impl<V> TimedValue<V> {
    /// Create a timed value that is kept (stale) after expiry.
    pub fn new(value: V, expires_at: u64) -> Self {
        Self {
            value,
            expires_at,
            remove_on_expired: false,
        }
    }

    /// Mark the value for outright removal once expired.
    pub fn remove_on_expired(mut self) -> Self {
        self.remove_on_expired = true;
        self
    }

    /// Whether the value is stale at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Cross-node cache update, pushed point-to-point to other cluster members.
///
/// `sync = false` marks an update that was received from elsewhere and must
/// never be re-broadcast; this is the sole safeguard against broadcast
/// amplification when leadership is briefly ambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncUpdate<K, V> {
    /// Name of the cache this update belongs to.
    pub cache_name: String,
    /// The key being updated.
    pub key: K,
    /// The new value with its expiry.
    pub value: TimedValue<V>,
    /// Whether the receiver may broadcast this update further.
    pub sync: bool,
}

/// Aggregated cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently held.
    pub entries: u64,
    /// Total client requests seen.
    pub requests: u64,
    /// Requests answered from a fresh entry.
    pub hits: u64,
    /// Requests for keys with no entry.
    pub misses: u64,
    /// Requests that found an expired entry.
    pub expired: u64,
}

impl CacheStats {
    /// Fold another shard's counters into this one.
    pub fn merge(&mut self, other: &CacheStats) {
        self.entries += other.entries;
        self.requests += other.requests;
        self.hits += other.hits;
        self.misses += other.misses;
        self.expired += other.expired;
    }
}
