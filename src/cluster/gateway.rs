//! Leader-gated refresh decisions and best-effort update broadcast.

use crate::cluster::view::{ClusterView, NodeAddr};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::types::{CacheKey, CacheValue, SyncUpdate, TimedValue};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Transport used to reach other cluster members.
///
/// Implementations carry the wire format; the cache core only cares about
/// the two logical operations.
#[async_trait]
pub trait ClusterTransport<K, V>: Send + Sync + 'static
where
    K: CacheKey,
    V: CacheValue,
{
    /// Ask the leader's corresponding worker for a key. `Ok(None)` means the
    /// leader found no data for the key.
    async fn forward_get(
        &self,
        leader: NodeAddr,
        cache_name: &str,
        key: K,
    ) -> Result<Option<TimedValue<V>>>;

    /// Push an update to one member. Best effort: no acknowledgment, no retry.
    async fn push_update(&self, peer: NodeAddr, update: SyncUpdate<K, V>) -> Result<()>;
}

/// Transport for single-node use: forwards fail, pushes are dropped.
#[derive(Debug, Default)]
pub struct NoTransport;

#[async_trait]
impl<K, V> ClusterTransport<K, V> for NoTransport
where
    K: CacheKey,
    V: CacheValue,
{
    async fn forward_get(
        &self,
        _leader: NodeAddr,
        _cache_name: &str,
        _key: K,
    ) -> Result<Option<TimedValue<V>>> {
        Err(Error::forward("no cluster transport configured"))
    }

    async fn push_update(&self, _peer: NodeAddr, _update: SyncUpdate<K, V>) -> Result<()> {
        Ok(())
    }
}

/// Per-worker decision point for where a refresh executes.
///
/// Holds a read-only view snapshot refreshed by membership messages; cloned
/// into spawned refresh tasks.
#[derive(Clone)]
pub(crate) struct LeaderGateway<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    leader_gated: bool,
    broadcast_sync: bool,
    cache_name: String,
    forward_timeout: Duration,
    view: ClusterView,
    transport: Arc<dyn ClusterTransport<K, V>>,
}

impl<K, V> LeaderGateway<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    pub(crate) fn new(config: &CacheConfig, transport: Arc<dyn ClusterTransport<K, V>>) -> Self {
        Self {
            leader_gated: config.leader_gated,
            broadcast_sync: config.broadcast_sync,
            cache_name: config.name.clone(),
            forward_timeout: config.forward_timeout,
            view: ClusterView::default(),
            transport,
        }
    }

    pub(crate) fn update_view(&mut self, view: ClusterView) {
        self.view = view;
    }

    pub(crate) fn is_self_leader(&self) -> bool {
        self.view.is_self_leader()
    }

    /// Whether the next refresh should call the data source directly.
    ///
    /// An unknown leader falls back to a local fetch rather than stalling.
    pub(crate) fn fetch_locally(&self) -> bool {
        !self.leader_gated || self.view.is_self_leader() || self.view.leader.is_none()
    }

    pub(crate) fn broadcast_enabled(&self) -> bool {
        self.broadcast_sync
    }

    /// Forward a get to the current leader, bounded by the forward timeout.
    /// Timeout expiry is reported as a refresh failure.
    pub(crate) async fn forward(&self, key: K) -> Result<Option<TimedValue<V>>> {
        let leader = self
            .view
            .leader
            .ok_or_else(|| Error::forward("leader unknown"))?;
        match tokio::time::timeout(
            self.forward_timeout,
            self.transport.forward_get(leader, &self.cache_name, key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Push an update to every other member, fire-and-forget.
    pub(crate) fn broadcast(&self, update: SyncUpdate<K, V>) {
        for peer in self.view.peers() {
            let peer = *peer;
            let transport = self.transport.clone();
            let update = update.clone();
            let cache_name = self.cache_name.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.push_update(peer, update).await {
                    tracing::warn!(cache = %cache_name, %peer, error = %e, "update broadcast failed");
                }
            });
        }
    }
}
