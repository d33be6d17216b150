//! Shared helpers for the end-to-end tests.

use crate::cache::router::ShardRouter;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::network::{NetworkServer, TcpTransport};
use crate::source::DataSource;
use crate::types::TimedValue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory source that counts fetches; items can be changed mid-test.
pub(crate) struct TestSource {
    pub(crate) items: Mutex<HashMap<String, TimedValue<String>>>,
    pub(crate) fetches: AtomicU64,
}

impl TestSource {
    pub(crate) fn new(items: HashMap<String, TimedValue<String>>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            fetches: AtomicU64::new(0),
        })
    }

    pub(crate) fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource<String, String> for TestSource {
    async fn fetch(&self, key: &String) -> Result<Option<TimedValue<String>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().get(key).cloned())
    }
}

/// One node of a test cluster: router, listener and its private source.
pub(crate) struct TestNode {
    pub(crate) router: Arc<ShardRouter<String, String>>,
    pub(crate) server: NetworkServer,
    pub(crate) source: Arc<TestSource>,
}

impl TestNode {
    /// Start a node on an OS-assigned loopback port.
    pub(crate) async fn start(
        config: CacheConfig,
        items: HashMap<String, TimedValue<String>>,
    ) -> Self {
        init_tracing();
        let source = TestSource::new(items);
        let router = Arc::new(ShardRouter::new(
            config,
            source.clone(),
            Arc::new(TcpTransport::new()),
            Vec::new(),
        ));
        let server = NetworkServer::bind("127.0.0.1:0".parse().unwrap(), router.clone())
            .await
            .expect("bind test node");
        Self {
            router,
            server,
            source,
        }
    }

    pub(crate) fn addr(&self) -> crate::cluster::NodeAddr {
        self.server.local_addr()
    }
}

/// Poll `action` until `predicate` accepts its result or `timeout` elapses.
pub(crate) async fn wait_for<F, Fut, T, P>(
    mut action: F,
    predicate: P,
    timeout: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let interval = Duration::from_millis(20);

    while start.elapsed() < timeout {
        let result = action().await;
        if predicate(&result) {
            return Some(result);
        }
        sleep(interval).await;
    }
    None
}
