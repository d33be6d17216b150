//! Single-writer cache worker and its request state machine.
//!
//! Each worker owns one shard of the key space and processes one message at
//! a time from its inbound queue; all mutation of its entries happens on that
//! single task. Refresh calls to the data source (or to the cluster leader)
//! run in spawned tasks and post their outcome back into the same queue, so
//! completions race only through the mailbox, never through shared state.

pub mod client;
mod entry;
pub mod router;

use crate::cluster::{ClusterView, LeaderGateway};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::source::{DataSource, ValueModifier};
use crate::types::{now_ms, CacheKey, CacheStats, CacheValue, SyncUpdate, TimedValue};
use entry::CacheEntry;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Per-request response shaping: one variant per request kind.
///
/// A responder is resolved exactly once, with either the value shaped for its
/// request or a failure.
pub(crate) enum Responder<V> {
    /// Plain get: the full value.
    Value(oneshot::Sender<Result<V>>),

    /// Get with freshness metadata; used for leader-forwarded requests whose
    /// reply must carry the expiry for the follower's monotonic apply.
    Timed(oneshot::Sender<Result<TimedValue<V>>>),

    /// Sub-slice of a list-typed value.
    Range {
        /// First element of the slice.
        start: usize,
        /// Maximum number of elements.
        count: usize,
        /// Receiver of the sliced value.
        tx: oneshot::Sender<Result<V>>,
    },

    /// Element count of a list-typed value.
    Size(oneshot::Sender<Result<usize>>),

    /// Background refresh: nobody is waiting.
    None,
}

impl<V: CacheValue> Responder<V> {
    fn is_none(&self) -> bool {
        matches!(self, Responder::None)
    }

    /// Resolve with a value, shaped for the request kind.
    fn send_timed(self, timed: &TimedValue<V>) {
        match self {
            Responder::Value(tx) => {
                let _ = tx.send(Ok(timed.value.clone()));
            }
            Responder::Timed(tx) => {
                let _ = tx.send(Ok(timed.clone()));
            }
            Responder::Range { start, count, tx } => {
                let reply = timed
                    .value
                    .slice_range(start, count)
                    .ok_or(Error::BadResponseShape("range request against a non-list value"));
                let _ = tx.send(reply);
            }
            Responder::Size(tx) => {
                let reply = timed
                    .value
                    .list_len()
                    .ok_or(Error::BadResponseShape("size request against a non-list value"));
                let _ = tx.send(reply);
            }
            Responder::None => {}
        }
    }

    /// Resolve with a failure.
    fn fail(self, error: Error) {
        match self {
            Responder::Value(tx) => {
                let _ = tx.send(Err(error));
            }
            Responder::Timed(tx) => {
                let _ = tx.send(Err(error));
            }
            Responder::Range { tx, .. } => {
                let _ = tx.send(Err(error));
            }
            Responder::Size(tx) => {
                let _ = tx.send(Err(error));
            }
            Responder::None => {}
        }
    }
}

/// Outcome of one triggered refresh, posted back into the worker's inbox.
pub(crate) enum RefreshOutcome<V> {
    /// The source produced a timed value.
    Fetched(TimedValue<V>),
    /// The source has no data for the key (terminal).
    NotFound,
    /// Transient failure.
    Failed(Error),
}

impl<V> From<Result<Option<TimedValue<V>>>> for RefreshOutcome<V> {
    fn from(result: Result<Option<TimedValue<V>>>) -> Self {
        match result {
            Ok(Some(timed)) => RefreshOutcome::Fetched(timed),
            Ok(None) => RefreshOutcome::NotFound,
            Err(e) => RefreshOutcome::Failed(e),
        }
    }
}

/// Messages processed by a cache worker.
pub(crate) enum CacheMsg<K, V> {
    /// Client read, in any of its shapes.
    Get { key: K, responder: Responder<V> },

    /// Upstream mutation through the data source.
    Modify {
        key: K,
        modifier: ValueModifier<V>,
        responder: Responder<V>,
    },

    /// Force a key's expiry into the past.
    MarkDirty { key: K },

    /// Completion of a refresh, a modify, or an externally pushed update.
    /// `sync = false` results are never re-broadcast.
    Refreshed {
        key: K,
        outcome: RefreshOutcome<V>,
        sync: bool,
        responder: Responder<V>,
    },

    /// New membership/leadership snapshot.
    ClusterViewChanged(ClusterView),

    /// Shard statistics probe.
    Stats(oneshot::Sender<CacheStats>),
}

/// What a Get decided to do, computed under the entry borrow and acted on
/// after it is released.
enum GetAction<V> {
    Respond(TimedValue<V>),
    Hold,
    HoldAndRefresh,
    RespondStaleAndRefresh(TimedValue<V>),
    Fail(Error),
}

/// Single-writer state machine owning one shard of the key space.
pub(crate) struct CacheWorker<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    config: Arc<CacheConfig>,
    source: Arc<dyn DataSource<K, V>>,
    gateway: LeaderGateway<K, V>,
    entries: HashMap<K, CacheEntry<K, V>>,
    /// Requesters held until the in-flight refresh for their key completes.
    pending: HashMap<K, Vec<Responder<V>>>,
    /// Sender side of our own inbox, for posting refresh completions.
    inbox_tx: mpsc::Sender<CacheMsg<K, V>>,
    requests: u64,
    hits: u64,
    misses: u64,
    expired: u64,
}

impl<K, V> CacheWorker<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    fn new(
        config: Arc<CacheConfig>,
        source: Arc<dyn DataSource<K, V>>,
        gateway: LeaderGateway<K, V>,
        inbox_tx: mpsc::Sender<CacheMsg<K, V>>,
    ) -> Self {
        Self {
            config,
            source,
            gateway,
            entries: HashMap::new(),
            pending: HashMap::new(),
            inbox_tx,
            requests: 0,
            hits: 0,
            misses: 0,
            expired: 0,
        }
    }

    /// Spawn a worker task and return the sender side of its inbox.
    pub(crate) fn spawn(
        config: Arc<CacheConfig>,
        source: Arc<dyn DataSource<K, V>>,
        gateway: LeaderGateway<K, V>,
        init_keys: Vec<K>,
    ) -> mpsc::Sender<CacheMsg<K, V>> {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let worker = Self::new(config, source, gateway, tx.clone());
        tokio::spawn(worker.run(rx, init_keys));
        tx
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<CacheMsg<K, V>>, init_keys: Vec<K>) {
        self.warm_start(&init_keys).await;

        let mut clean_tick = jittered_interval(self.config.clean_period);
        let mut update_tick = self.config.auto_update_period.map(jittered_interval);

        debug!(cache = %self.config.name, "cache worker started");
        loop {
            tokio::select! {
                msg = inbox.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    // All senders dropped: pool shut down.
                    None => break,
                },
                _ = clean_tick.tick() => self.handle_clean_tick(),
                _ = tick_or_never(&mut update_tick) => self.handle_auto_update_tick(),
            }
        }
        debug!(cache = %self.config.name, "cache worker stopped");
    }

    async fn warm_start(&mut self, keys: &[K]) {
        if keys.is_empty() {
            return;
        }
        let min = self.config.min_backoff.as_millis() as u64;
        let items = self.source.init(keys).await;
        let now = now_ms();
        let loaded = items.len();
        for (key, timed) in items {
            let mut entry = CacheEntry::new(key.clone(), now, min);
            entry.apply(timed, min);
            self.entries.insert(key, entry);
        }
        info!(cache = %self.config.name, loaded, "cache warm start complete");
    }

    fn handle(&mut self, msg: CacheMsg<K, V>) {
        match msg {
            CacheMsg::Get { key, responder } => self.handle_get(key, responder),
            CacheMsg::Modify {
                key,
                modifier,
                responder,
            } => self.handle_modify(key, modifier, responder),
            CacheMsg::MarkDirty { key } => self.handle_mark_dirty(key),
            CacheMsg::Refreshed {
                key,
                outcome,
                sync,
                responder,
            } => self.handle_refreshed(key, outcome, sync, responder),
            CacheMsg::ClusterViewChanged(view) => self.gateway.update_view(view),
            CacheMsg::Stats(tx) => {
                let _ = tx.send(CacheStats {
                    entries: self.entries.len() as u64,
                    requests: self.requests,
                    hits: self.hits,
                    misses: self.misses,
                    expired: self.expired,
                });
            }
        }
    }

    fn handle_get(&mut self, key: K, responder: Responder<V>) {
        self.requests += 1;
        let now = now_ms();
        let min = self.config.min_backoff.as_millis() as u64;
        let max = self.config.max_backoff.as_millis() as u64;

        let action = match self.entries.get_mut(&key) {
            None => {
                // First sight of the key: the empty entry gates duplicate
                // fetches while the first one is in flight.
                self.misses += 1;
                let mut entry = CacheEntry::new(key.clone(), now, min);
                entry.arm_backoff(now, max);
                self.entries.insert(key.clone(), entry);
                GetAction::HoldAndRefresh
            }
            Some(entry) if entry.is_expired(now) => {
                self.expired += 1;
                if entry.backoff_active(now) {
                    match entry.value_and_touch(now).cloned() {
                        Some(timed) => GetAction::Respond(timed),
                        None if entry.refresh_in_flight() => GetAction::Hold,
                        // Last attempt failed and there is nothing to serve.
                        None => GetAction::Fail(entry.suppressed_error()),
                    }
                } else {
                    entry.arm_backoff(now, max);
                    if self.config.wait_for_refresh {
                        GetAction::HoldAndRefresh
                    } else {
                        match entry.value_and_touch(now) {
                            Some(timed) => GetAction::RespondStaleAndRefresh(timed.clone()),
                            // A miss always blocks until a first value or failure.
                            None => GetAction::HoldAndRefresh,
                        }
                    }
                }
            }
            Some(entry) => {
                self.hits += 1;
                match entry.value_and_touch(now) {
                    Some(timed) => GetAction::Respond(timed.clone()),
                    None => GetAction::Hold,
                }
            }
        };

        match action {
            GetAction::Respond(timed) => {
                trace!(cache = %self.config.name, ?key, "cache hit");
                responder.send_timed(&timed);
            }
            GetAction::Hold => self.hold(key, responder),
            GetAction::HoldAndRefresh => {
                trace!(cache = %self.config.name, ?key, "issuing refresh, holding requester");
                self.hold(key.clone(), responder);
                self.spawn_refresh(key);
            }
            GetAction::RespondStaleAndRefresh(timed) => {
                trace!(cache = %self.config.name, ?key, "serving stale value, refreshing in background");
                responder.send_timed(&timed);
                self.spawn_refresh(key);
            }
            GetAction::Fail(error) => responder.fail(error),
        }
    }

    fn hold(&mut self, key: K, responder: Responder<V>) {
        if !responder.is_none() {
            self.pending.entry(key).or_default().push(responder);
        }
    }

    /// Start one refresh for the key. The caller must already have armed the
    /// entry's backoff; this only runs the I/O and posts the completion.
    fn spawn_refresh(&self, key: K) {
        let source = self.source.clone();
        let gateway = self.gateway.clone();
        let inbox = self.inbox_tx.clone();
        let cache_name = self.config.name.clone();
        tokio::spawn(async move {
            let (outcome, sync) = if gateway.fetch_locally() {
                (RefreshOutcome::from(source.fetch(&key).await), true)
            } else {
                trace!(cache = %cache_name, ?key, "forwarding refresh to leader");
                // Forwarded results are tagged sync=false: only direct
                // fetches may be broadcast.
                (RefreshOutcome::from(gateway.forward(key.clone()).await), false)
            };
            let msg = CacheMsg::Refreshed {
                key,
                outcome,
                sync,
                responder: Responder::None,
            };
            if inbox.send(msg).await.is_err() {
                debug!(cache = %cache_name, "worker gone before refresh completion");
            }
        });
    }

    fn handle_modify(&mut self, key: K, modifier: ValueModifier<V>, responder: Responder<V>) {
        // Modify always executes through the local source: closures cannot
        // be forwarded to the leader.
        let source = self.source.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let outcome = RefreshOutcome::from(source.modify(&key, modifier).await);
            let _ = inbox
                .send(CacheMsg::Refreshed {
                    key,
                    outcome,
                    sync: true,
                    responder,
                })
                .await;
        });
    }

    fn handle_mark_dirty(&mut self, key: K) {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.mark_dirty();
                debug!(cache = %self.config.name, ?key, "entry marked dirty");
            }
            None => {
                debug!(cache = %self.config.name, ?key, "mark dirty for key with no entry");
            }
        }
        self.source.after_dirty_marked(&key);
    }

    fn handle_refreshed(
        &mut self,
        key: K,
        outcome: RefreshOutcome<V>,
        sync: bool,
        responder: Responder<V>,
    ) {
        let now = now_ms();
        let min = self.config.min_backoff.as_millis() as u64;

        let mut waiters = self.pending.remove(&key).unwrap_or_default();
        if !responder.is_none() {
            waiters.push(responder);
        }

        match outcome {
            RefreshOutcome::Fetched(timed) => {
                let entry = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| CacheEntry::new(key.clone(), now, min));
                let applied = entry.apply(timed.clone(), min);
                entry.refresh_settled(None);
                if applied {
                    trace!(cache = %self.config.name, ?key, "cache updated");
                } else {
                    debug!(
                        cache = %self.config.name,
                        ?key,
                        "refresh result rejected: expiry not newer than cached"
                    );
                }
                for waiter in waiters {
                    waiter.send_timed(&timed);
                }
                // Only a leader's own fetch fans out; anything received with
                // sync=false stays put even if we believe ourselves leader.
                if sync && self.gateway.broadcast_enabled() && self.gateway.is_self_leader() {
                    self.gateway.broadcast(SyncUpdate {
                        cache_name: self.config.name.clone(),
                        key,
                        value: timed,
                        sync: false,
                    });
                }
            }
            RefreshOutcome::NotFound => {
                debug!(cache = %self.config.name, ?key, "data source has no data for key");
                let placeholder = self
                    .entries
                    .get(&key)
                    .map(|e| e.value().is_none())
                    .unwrap_or(false);
                if placeholder {
                    // Never keep an entry for a key the source has no data for.
                    self.entries.remove(&key);
                } else if let Some(entry) = self.entries.get_mut(&key) {
                    entry.refresh_settled(None);
                }
                let error = Error::not_found(&key);
                for waiter in waiters {
                    waiter.fail(error.clone());
                }
            }
            RefreshOutcome::Failed(error) => {
                let stale = match self.entries.get_mut(&key) {
                    Some(entry) => {
                        entry.refresh_settled(Some(error.clone()));
                        if waiters.is_empty() {
                            // Background refresh: nothing to deliver, and the
                            // idle timer must not be reset.
                            None
                        } else {
                            entry.value_and_touch(now).cloned()
                        }
                    }
                    None => None,
                };
                match stale {
                    Some(timed) => {
                        warn!(
                            cache = %self.config.name,
                            ?key,
                            error = %error,
                            "refresh failed, serving stale value"
                        );
                        for waiter in waiters {
                            waiter.send_timed(&timed);
                        }
                    }
                    None => {
                        warn!(
                            cache = %self.config.name,
                            ?key,
                            error = %error,
                            "refresh failed, no data to serve"
                        );
                        for waiter in waiters {
                            waiter.fail(error.clone());
                        }
                    }
                }
            }
        }
    }

    /// Remove idle entries and expired entries flagged for removal.
    ///
    /// Reads `last_access_at` directly; running a sweep never counts as an
    /// access.
    fn handle_clean_tick(&mut self) {
        let now = now_ms();
        let config_idle = self.config.idle_timeout;

        let mut removed: Vec<K> = Vec::new();
        for (key, entry) in &self.entries {
            let idle = self.source.idle_timeout(key).or(config_idle);
            if let Some(idle) = idle {
                let idle_ms = idle.as_millis() as u64;
                if idle_ms > 0 && entry.idle_expired(now, idle_ms) {
                    removed.push(key.clone());
                    continue;
                }
            }
            if entry.is_expired(now) && entry.remove_on_expired() {
                removed.push(key.clone());
            }
        }

        if !removed.is_empty() {
            debug!(
                cache = %self.config.name,
                total = self.entries.len(),
                removing = removed.len(),
                "cleanup sweep"
            );
        }
        for key in &removed {
            self.entries.remove(key);
        }
    }

    /// Pre-warm expired entries the source opted into auto-updating, subject
    /// to the same backoff gate as a client-triggered refresh.
    fn handle_auto_update_tick(&mut self) {
        let now = now_ms();
        let max = self.config.max_backoff.as_millis() as u64;

        let mut to_refresh: Vec<K> = Vec::new();
        for (key, entry) in &self.entries {
            if !entry.is_expired(now) || entry.backoff_active(now) {
                continue;
            }
            // Peek, never touch: auto-update must not reset the idle timer.
            let Some(timed) = entry.value() else { continue };
            if self.source.auto_refresh(key, &timed.value) {
                to_refresh.push(key.clone());
            }
        }

        for key in to_refresh {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.arm_backoff(now, max);
            }
            debug!(cache = %self.config.name, ?key, "auto updating expired entry");
            self.spawn_refresh(key);
        }
    }
}

/// A periodic timer with a bounded random offset so the workers of a pool do
/// not sweep in lockstep.
fn jittered_interval(period: Duration) -> time::Interval {
    let jitter = period
        .checked_div(10)
        .map(|d| d.mul_f64(rand::thread_rng().gen::<f64>()))
        .unwrap_or(Duration::ZERO);
    let period = period + jitter;
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Tick an optional interval, or park forever when the timer is disabled.
async fn tick_or_never(interval: &mut Option<time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
