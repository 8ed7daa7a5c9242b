use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use carestate_types::{validate_bucket_name, Snapshot};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::SnapshotBackend;

/// File extension of snapshot files.
const SNAPSHOT_EXT: &str = "json";

/// Directory-backed snapshot store.
///
/// On-disk layout:
/// ```text
/// <root>/
///   users.json          {"bucket": "users", "data": {...}, "updated_at": "..."}
///   appointments.json
/// ```
///
/// Each upsert serializes the snapshot into a temporary file inside `root`,
/// syncs it, then renames it over `<bucket>.json`. Readers therefore see
/// either the previous snapshot or the new one, never a torn write. Blocking
/// file I/O runs on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct FileSnapshotBackend {
    root: PathBuf,
}

impl FileSnapshotBackend {
    /// Open (or create) a snapshot directory.
    pub fn open(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory holding the snapshot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file for `bucket`.
    pub fn snapshot_path(&self, bucket: &str) -> PathBuf {
        self.root.join(format!("{bucket}.{SNAPSHOT_EXT}"))
    }

    fn write_atomic(root: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        // The rename is only durable once the directory entry is synced.
        #[cfg(unix)]
        fs::File::open(root)?.sync_all()?;
        Ok(())
    }

    fn read_snapshot(path: &Path, bucket: &str) -> BackendResult<Option<Snapshot>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Corrupt {
                bucket: bucket.to_string(),
                reason: e.to_string(),
            })?;
        if snapshot.bucket != bucket {
            return Err(BackendError::Corrupt {
                bucket: bucket.to_string(),
                reason: format!("file holds snapshot for {:?}", snapshot.bucket),
            });
        }
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl SnapshotBackend for FileSnapshotBackend {
    async fn upsert(&self, bucket: &str, data: &Value) -> BackendResult<Snapshot> {
        validate_bucket_name(bucket)?;
        let snapshot = Snapshot::now(bucket, data.clone());
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let root = self.root.clone();
        let path = self.snapshot_path(bucket);
        let len = bytes.len();
        tokio::task::spawn_blocking(move || Self::write_atomic(&root, &path, &bytes)).await??;

        debug!(bucket, bytes = len, "snapshot file replaced");
        Ok(snapshot)
    }

    async fn load(&self, bucket: &str) -> BackendResult<Option<Snapshot>> {
        validate_bucket_name(bucket)?;
        let path = self.snapshot_path(bucket);
        let bucket = bucket.to_string();
        tokio::task::spawn_blocking(move || Self::read_snapshot(&path, &bucket)).await?
    }

    async fn list_buckets(&self) -> BackendResult<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> BackendResult<Vec<String>> {
            let mut names = Vec::new();
            for entry in fs::read_dir(&root)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if validate_bucket_name(stem).is_ok() {
                        names.push(stem.to_string());
                    }
                }
            }
            names.sort();
            Ok(names)
        })
        .await?
    }

    fn describe(&self) -> String {
        format!("file:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_writes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        backend.upsert("users", &json!({"u1": true})).await.unwrap();

        let raw = fs::read(backend.snapshot_path("users")).unwrap();
        let snap: Snapshot = serde_json::from_slice(&raw).unwrap();
        assert_eq!(snap.bucket, "users");
        assert_eq!(snap.data, json!({"u1": true}));
    }

    #[tokio::test]
    async fn load_round_trips_and_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        assert!(backend.load("foo").await.unwrap().is_none());

        backend.upsert("foo", &json!({"x": "y"})).await.unwrap();
        let snap = backend.load("foo").await.unwrap().unwrap();
        assert_eq!(snap.data, json!({"x": "y"}));
    }

    #[test]
    fn write_atomic_replaces_target_and_syncs_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        FileSnapshotBackend::write_atomic(dir.path(), &path, b"{}").unwrap();
        FileSnapshotBackend::write_atomic(dir.path(), &path, b"[]").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");

        // A vanished root fails the write instead of reporting success.
        let gone = dir.path().join("gone");
        assert!(FileSnapshotBackend::write_atomic(&gone, &gone.join("x.json"), b"{}").is_err());
    }

    #[tokio::test]
    async fn overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        for i in 0..5 {
            backend.upsert("messages", &json!([i])).await.unwrap();
        }
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let snap = backend.load("messages").await.unwrap().unwrap();
        assert_eq!(snap.data, json!([4]));
    }

    #[tokio::test]
    async fn repeated_upsert_only_changes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        let first = backend.upsert("foo", &json!({"a": [1, 2]})).await.unwrap();
        let second = backend.upsert("foo", &json!({"a": [1, 2]})).await.unwrap();
        assert!(first.same_content(&second));
        assert_eq!(
            serde_json::to_vec(&first.data).unwrap(),
            serde_json::to_vec(&backend.load("foo").await.unwrap().unwrap().data).unwrap()
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        fs::write(backend.snapshot_path("users"), b"{not json").unwrap();

        let err = backend.load("users").await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { ref bucket, .. } if bucket == "users"));
    }

    #[tokio::test]
    async fn mismatched_bucket_field_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        let other = Snapshot::now("doctors", json!({}));
        fs::write(backend.snapshot_path("users"), serde_json::to_vec(&other).unwrap()).unwrap();

        assert!(matches!(
            backend.load("users").await,
            Err(BackendError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn list_buckets_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileSnapshotBackend::open(dir.path()).unwrap();
        backend.upsert("users", &json!({})).await.unwrap();
        backend.upsert("appointments", &json!([])).await.unwrap();
        fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        assert_eq!(
            backend.list_buckets().await.unwrap(),
            vec!["appointments", "users"]
        );
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let backend = FileSnapshotBackend::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(backend.describe(), format!("file:{}", nested.display()));
    }
}
