//! Test backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use carestate_backend::{BackendResult, InMemorySnapshotBackend, SnapshotBackend};
use carestate_types::Snapshot;
use serde_json::Value;

/// An in-memory backend whose upserts take `delay` to complete and which
/// records concurrency and write history.
pub(crate) struct SlowBackend {
    inner: InMemorySnapshotBackend,
    delay: Duration,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    history: Mutex<Vec<Value>>,
}

impl SlowBackend {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            inner: InMemorySnapshotBackend::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every value written, in completion order.
    pub(crate) fn history(&self) -> Vec<Value> {
        self.history.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl SnapshotBackend for SlowBackend {
    async fn upsert(&self, bucket: &str, data: &Value) -> BackendResult<Snapshot> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.upsert(bucket, data).await;
        if result.is_ok() {
            self.history.lock().expect("lock poisoned").push(data.clone());
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn load(&self, bucket: &str) -> BackendResult<Option<Snapshot>> {
        self.inner.load(bucket).await
    }

    async fn load_all(&self, buckets: &[String]) -> BackendResult<HashMap<String, Snapshot>> {
        self.inner.load_all(buckets).await
    }

    async fn list_buckets(&self) -> BackendResult<Vec<String>> {
        self.inner.list_buckets().await
    }

    fn describe(&self) -> String {
        "slow-memory:".to_string()
    }
}
