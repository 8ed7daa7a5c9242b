use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use carestate_types::{validate_bucket_name, Snapshot};
use serde_json::Value;

use crate::error::{BackendError, BackendResult};
use crate::traits::SnapshotBackend;

/// In-memory, HashMap-based snapshot backend.
///
/// Intended for tests and embedding. Snapshots live behind a `RwLock` and are
/// cloned on read/write. Every upsert is counted per bucket so callers can
/// assert how many durable writes a workload produced.
pub struct InMemorySnapshotBackend {
    snapshots: RwLock<HashMap<String, Snapshot>>,
    upserts: RwLock<HashMap<String, u64>>,
    unavailable: AtomicBool,
}

impl InMemorySnapshotBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            upserts: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Store a snapshot directly, without counting it as an upsert.
    pub fn seed(&self, snapshot: Snapshot) {
        self.snapshots
            .write()
            .expect("lock poisoned")
            .insert(snapshot.bucket.clone(), snapshot);
    }

    /// The stored snapshot for `bucket`, if any.
    pub fn get(&self, bucket: &str) -> Option<Snapshot> {
        self.snapshots
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .cloned()
    }

    /// Number of upserts received for `bucket` (successful or not).
    pub fn upsert_count(&self, bucket: &str) -> u64 {
        self.upserts
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .copied()
            .unwrap_or(0)
    }

    /// Number of upserts received across all buckets.
    pub fn total_upserts(&self) -> u64 {
        self.upserts.read().expect("lock poisoned").values().sum()
    }

    /// Simulate an outage: while set, every operation fails with
    /// [`BackendError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().expect("lock poisoned").is_empty()
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("in-memory backend offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemorySnapshotBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotBackend for InMemorySnapshotBackend {
    async fn upsert(&self, bucket: &str, data: &Value) -> BackendResult<Snapshot> {
        validate_bucket_name(bucket)?;
        *self
            .upserts
            .write()
            .expect("lock poisoned")
            .entry(bucket.to_string())
            .or_insert(0) += 1;
        self.check_available()?;

        let snapshot = Snapshot::now(bucket, data.clone());
        self.snapshots
            .write()
            .expect("lock poisoned")
            .insert(bucket.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    async fn load(&self, bucket: &str) -> BackendResult<Option<Snapshot>> {
        self.check_available()?;
        Ok(self.get(bucket))
    }

    async fn list_buckets(&self) -> BackendResult<Vec<String>> {
        self.check_available()?;
        let mut names: Vec<String> = self
            .snapshots
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    fn describe(&self) -> String {
        "memory:".to_string()
    }
}

impl std::fmt::Debug for InMemorySnapshotBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySnapshotBackend")
            .field("snapshot_count", &self.len())
            .field("total_upserts", &self.total_upserts())
            .finish()
    }
}
