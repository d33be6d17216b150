//! Configuration for a cache pool.

use std::time::Duration;

/// Smallest backoff interval armed after a triggered refresh.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(3);

/// Largest backoff interval the doubling is capped at.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Main configuration for a cache pool.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of this cache, used in logs and cross-node messages.
    pub name: String,

    /// Number of single-writer workers the key space is sharded over.
    /// Fixed for the lifetime of the pool.
    pub workers: usize,

    /// Capacity of each worker's inbound message queue.
    pub mailbox_capacity: usize,

    /// Initial backoff interval armed when a refresh is triggered.
    pub min_backoff: Duration,

    /// Cap for the backoff interval doubling.
    pub max_backoff: Duration,

    /// If true, a request hitting an expired entry waits for the refresh
    /// to complete; if false, it gets the stale value immediately and the
    /// refresh runs in the background.
    pub wait_for_refresh: bool,

    /// If true, only the cluster leader calls the data source; other nodes
    /// forward the request to the leader.
    pub leader_gated: bool,

    /// If true, the leader pushes successful fetches to all other members.
    pub broadcast_sync: bool,

    /// Remove entries not read for this long. `None` keeps entries forever.
    /// The data source can override this per key.
    pub idle_timeout: Option<Duration>,

    /// Base period of the cleanup sweep. A random offset of up to a tenth of
    /// the period is added per worker to spread sweeps across the pool.
    pub clean_period: Duration,

    /// Base period of the auto-update sweep that pre-warms expired entries.
    /// `None` disables it.
    pub auto_update_period: Option<Duration>,

    /// Default timeout applied by the client facade.
    pub request_timeout: Duration,

    /// Timeout for a single leader-forward call. Its expiry is treated as a
    /// refresh failure, distinct from the client's own timeout.
    pub forward_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            workers: 4,
            mailbox_capacity: 1024,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            wait_for_refresh: true,
            leader_gated: false,
            broadcast_sync: false,
            idle_timeout: None,
            clean_period: Duration::from_secs(60),
            auto_update_period: None,
            request_timeout: Duration::from_secs(10),
            forward_timeout: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    /// Create a configuration with the given cache name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the number of workers. Clamped to at least 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the backoff interval bounds.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max.max(min);
        self
    }

    /// Set whether expired reads wait for the refresh.
    pub fn with_wait_for_refresh(mut self, wait: bool) -> Self {
        self.wait_for_refresh = wait;
        self
    }

    /// Route all data source calls through the cluster leader.
    pub fn with_leader_gated(mut self, enabled: bool) -> Self {
        self.leader_gated = enabled;
        self
    }

    /// Push successful leader fetches to all other members.
    pub fn with_broadcast_sync(mut self, enabled: bool) -> Self {
        self.broadcast_sync = enabled;
        self
    }

    /// Set the idle eviction timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the cleanup sweep period.
    pub fn with_clean_period(mut self, period: Duration) -> Self {
        self.clean_period = period;
        self
    }

    /// Enable the auto-update sweep with the given period.
    pub fn with_auto_update_period(mut self, period: Duration) -> Self {
        self.auto_update_period = Some(period);
        self
    }

    /// Set the default client timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the leader-forward timeout.
    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }
}
