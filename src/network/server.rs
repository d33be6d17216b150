//! TCP listener serving forwarded gets and accepting pushed updates.

use crate::cache::router::ShardRouter;
use crate::error::{Error, Result};
use crate::network::rpc::{self, WireMessage};
use crate::types::{CacheKey, CacheValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Listener side of the wire protocol, backed by one cache's router.
pub struct NetworkServer {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

impl NetworkServer {
    /// Bind and start serving. The accept loop runs until [`shutdown`] is
    /// called or the server is dropped.
    ///
    /// [`shutdown`]: NetworkServer::shutdown
    pub async fn bind<K, V>(addr: SocketAddr, router: Arc<ShardRouter<K, V>>) -> Result<Self>
    where
        K: CacheKey + Serialize + DeserializeOwned,
        V: CacheValue + Serialize + DeserializeOwned,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            trace!(%peer, "accepted connection");
                            let router = router.clone();
                            tokio::spawn(serve_connection(stream, peer, router));
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!(%local_addr, "network server shutting down");
                        break;
                    }
                }
            }
        });

        info!(%local_addr, "network server listening");
        Ok(Self {
            local_addr,
            shutdown_tx,
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the accept loop. In-flight connections finish on their own.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn serve_connection<K, V>(mut stream: TcpStream, peer: SocketAddr, router: Arc<ShardRouter<K, V>>)
where
    K: CacheKey + Serialize + DeserializeOwned,
    V: CacheValue + Serialize + DeserializeOwned,
{
    loop {
        let msg = match rpc::read_frame::<WireMessage<K, V>, _>(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => {
                // Peer closed the connection, or sent garbage.
                trace!(%peer, "connection closed");
                return;
            }
        };

        match msg {
            WireMessage::ForwardGet { cache_name, key } => {
                let result = if cache_name == router.name() {
                    match router.get_timed(key).await {
                        Ok(timed) => Ok(Some(timed)),
                        // NotFound travels as an empty reply so the caller
                        // does not cache it.
                        Err(Error::NotFound(_)) => Ok(None),
                        Err(e) => Err(e.to_string()),
                    }
                } else {
                    debug!(%peer, %cache_name, "forwarded get for unknown cache");
                    Err(format!("unknown cache: {cache_name}"))
                };
                let reply = WireMessage::<K, V>::GetReply { result };
                if let Err(e) = rpc::write_frame(&mut stream, &reply).await {
                    debug!(%peer, error = %e, "failed to write reply");
                    return;
                }
            }
            WireMessage::SyncPush { update } => {
                if update.cache_name == router.name() {
                    if let Err(e) = router.apply_sync(update).await {
                        warn!(%peer, error = %e, "failed to apply pushed update");
                    }
                } else {
                    debug!(%peer, cache_name = %update.cache_name, "pushed update for unknown cache");
                }
            }
            WireMessage::GetReply { .. } => {
                debug!(%peer, "unexpected reply frame from client, closing");
                return;
            }
        }
    }
}
