use std::collections::HashMap;

use async_trait::async_trait;
use carestate_types::Snapshot;
use serde_json::Value;

use crate::error::BackendResult;

/// Durable store holding one snapshot per bucket name.
///
/// All implementations must satisfy these invariants:
/// - `upsert` atomically replaces the whole stored snapshot for a bucket
///   (insert if absent, overwrite if present) and stamps `updated_at`.
/// - Repeating an `upsert` with the same data changes nothing but the
///   timestamp.
/// - The backend never interprets snapshot contents.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Replace the stored snapshot for `bucket` with `data`.
    ///
    /// Returns the snapshot as written, including its new timestamp.
    async fn upsert(&self, bucket: &str, data: &Value) -> BackendResult<Snapshot>;

    /// Read the stored snapshot for `bucket`.
    ///
    /// Returns `Ok(None)` if nothing has been stored under that name.
    async fn load(&self, bucket: &str) -> BackendResult<Option<Snapshot>>;

    /// Names of every bucket that has a stored snapshot, sorted.
    async fn list_buckets(&self) -> BackendResult<Vec<String>>;

    /// Read the snapshots for many buckets at once.
    ///
    /// Buckets with no stored snapshot are absent from the returned map.
    /// Default implementation calls `load()` for each name. Backends may
    /// override for fewer round-trips.
    async fn load_all(&self, buckets: &[String]) -> BackendResult<HashMap<String, Snapshot>> {
        let mut found = HashMap::with_capacity(buckets.len());
        for bucket in buckets {
            if let Some(snapshot) = self.load(bucket).await? {
                found.insert(bucket.clone(), snapshot);
            }
        }
        Ok(found)
    }

    /// Human-readable description of where snapshots live.
    fn describe(&self) -> String;
}
