//! Wire protocol for inter-node traffic.
//!
//! Messages are bincode-encoded and framed with a u32 big-endian length
//! prefix. Frames are capped so a corrupt or hostile peer cannot make a node
//! allocate unbounded memory.

use crate::error::{Error, Result};
use crate::types::{SyncUpdate, TimedValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame's body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Messages exchanged between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage<K, V> {
    /// Ask the receiving node (the leader) to serve a get for `key`,
    /// refreshing from the data source if needed.
    ForwardGet {
        /// Cache the key belongs to.
        cache_name: String,
        /// The requested key.
        key: K,
    },

    /// Reply to [`WireMessage::ForwardGet`]. `Ok(None)` means the source has
    /// no data for the key; errors travel as display strings.
    GetReply {
        result: std::result::Result<Option<TimedValue<V>>, String>,
    },

    /// One-way best-effort update push; no reply is sent.
    SyncPush { update: SyncUpdate<K, V> },
}

/// Write one length-prefixed frame.
pub async fn write_frame<T, W>(writer: &mut W, msg: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = bincode::serialize(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Network(format!(
            "outgoing frame of {} bytes exceeds cap",
            body.len()
        )));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Network(format!(
            "incoming frame of {len} bytes exceeds cap"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(bincode::deserialize(&body)?)
}
