//! Self-refreshing read-through cache with cluster synchronization.
//!
//! This crate caches values that carry their own expiry and refreshes them
//! from a user-supplied [`DataSource`] on demand:
//! - **Single-writer workers**: each key hashes to one worker, so all state
//!   for a key mutates on one task with no locks
//! - **Backoff-gated refresh**: at most one refresh per key is in flight,
//!   and repeated staleness doubles the retry suppression window
//! - **Stale-on-failure**: a failing source degrades reads to the last good
//!   value instead of an error
//! - **Optional clustering**: refreshes can be funneled through a leader and
//!   fresh values pushed to peers, with a monotonic-freshness rule keeping
//!   out-of-order updates from regressing a cache
//!
//! # Example
//!
//! ```rust,no_run
//! use recache::{CacheClient, CacheConfig, DataSource, NoTransport, ShardRouter, TimedValue};
//! use recache::error::Result;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct UserSource;
//!
//! #[async_trait]
//! impl DataSource<String, String> for UserSource {
//!     async fn fetch(&self, key: &String) -> Result<Option<TimedValue<String>>> {
//!         // Load from a database, an upstream service, ...
//!         let expires_at = recache::now_ms() + 30_000;
//!         Ok(Some(TimedValue::new(format!("user:{key}"), expires_at)))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let router = Arc::new(ShardRouter::new(
//!         CacheConfig::new("users"),
//!         Arc::new(UserSource),
//!         Arc::new(NoTransport),
//!         Vec::new(),
//!     ));
//!     let client = CacheClient::new(router);
//!
//!     let value = client.get("alice".to_string()).await?;
//!     println!("{value}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
pub mod network;
pub mod source;
pub mod testing;
pub mod types;

pub use cache::client::CacheClient;
pub use cache::router::ShardRouter;
pub use cluster::{ClusterState, ClusterTransport, ClusterView, MemberEvent, NoTransport, NodeAddr};
pub use config::CacheConfig;
pub use error::Error;
pub use network::{NetworkServer, TcpTransport};
pub use source::{DataSource, ValueModifier};
pub use types::{now_ms, CacheKey, CacheStats, CacheValue, SyncUpdate, TimedValue};
