//! TCP implementation of the cluster transport.
//!
//! Connections are opened per call. Forwarded gets are rare by construction
//! (one per key per backoff window) and pushes are fire-and-forget, so the
//! connection cost is not worth pooling.

use crate::cluster::{ClusterTransport, NodeAddr};
use crate::error::{Error, Result};
use crate::network::rpc::{self, WireMessage};
use crate::types::{CacheKey, CacheValue, SyncUpdate, TimedValue};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-call TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect(&self, addr: NodeAddr) -> Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => Ok(stream?),
            Err(_) => Err(Error::Timeout),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> ClusterTransport<K, V> for TcpTransport
where
    K: CacheKey + Serialize + DeserializeOwned,
    V: CacheValue + Serialize + DeserializeOwned,
{
    async fn forward_get(
        &self,
        leader: NodeAddr,
        cache_name: &str,
        key: K,
    ) -> Result<Option<TimedValue<V>>> {
        let mut stream = self.connect(leader).await?;
        let request = WireMessage::<K, V>::ForwardGet {
            cache_name: cache_name.to_string(),
            key,
        };
        rpc::write_frame(&mut stream, &request).await?;
        match rpc::read_frame::<WireMessage<K, V>, _>(&mut stream).await? {
            WireMessage::GetReply { result } => result.map_err(Error::forward),
            _ => Err(Error::BadResponseShape("unexpected reply to forwarded get")),
        }
    }

    async fn push_update(&self, peer: NodeAddr, update: SyncUpdate<K, V>) -> Result<()> {
        let mut stream = self.connect(peer).await?;
        rpc::write_frame(&mut stream, &WireMessage::SyncPush { update }).await
    }
}
