use std::sync::Arc;
use std::time::Duration;

use carestate_backend::SnapshotBackend;
use carestate_types::{BucketKind, BucketSpec};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::{PersistenceMode, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::handles::{Mapping, Sequence};
use crate::hydrate::{hydrate, HydrationReport};
use crate::registry::Registry;
use crate::scheduler::{DrainOutcome, FlushScheduler};
use crate::tracker::Bucket;

/// Outcome of [`Store::drain_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Buckets whose pending state was written.
    pub flushed: Vec<String>,
    /// Buckets whose final write failed.
    pub failed: Vec<String>,
}

impl DrainReport {
    /// Returns `true` if no write failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Collects bucket registrations and persistence settings, then opens a
/// hydrated [`Store`].
pub struct StoreBuilder {
    specs: Vec<BucketSpec>,
    error: Option<StoreError>,
    mode: PersistenceMode,
    backend: Option<Arc<dyn SnapshotBackend>>,
    quiet_period: Duration,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            error: None,
            mode: PersistenceMode::Memory,
            backend: None,
            quiet_period: Duration::from_millis(StoreConfig::DEFAULT_QUIET_PERIOD_MS),
        }
    }

    /// Persistence settings from `config`. The backend is opened here, once.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let backend = config.resolve_backend()?;
        let mut builder = Self::new().quiet_period(config.quiet_period());
        if let Some(backend) = backend {
            builder = builder.durable(backend);
        }
        Ok(builder)
    }

    /// Register a bucket.
    ///
    /// # Panics
    ///
    /// Panics if a bucket with the same name is already registered.
    pub fn register(mut self, spec: BucketSpec) -> Self {
        assert!(
            !self.specs.iter().any(|s| s.name == spec.name),
            "bucket {:?} registered twice",
            spec.name
        );
        self.specs.push(spec);
        self
    }

    /// Register a mapping bucket with `default` as its initial value.
    pub fn mapping(self, name: impl Into<String>, default: Value) -> Self {
        self.register_value(name.into(), BucketKind::Mapping, default)
    }

    /// Register a sequence bucket with `default` as its initial value.
    pub fn sequence(self, name: impl Into<String>, default: Value) -> Self {
        self.register_value(name.into(), BucketKind::Sequence, default)
    }

    fn register_value(mut self, name: String, kind: BucketKind, default: Value) -> Self {
        match BucketSpec::new(name, kind, default) {
            Ok(spec) => self.register(spec),
            Err(e) => {
                self.error.get_or_insert(e.into());
                self
            }
        }
    }

    pub fn quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    pub fn mode(mut self, mode: PersistenceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn SnapshotBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Shorthand for `.backend(backend).mode(PersistenceMode::Durable)`.
    pub fn durable(self, backend: Arc<dyn SnapshotBackend>) -> Self {
        self.backend(backend).mode(PersistenceMode::Durable)
    }

    /// Create every bucket, hydrate from the backend, and return the store.
    ///
    /// Must be called inside a Tokio runtime; flush timers run on it.
    pub async fn open(self) -> StoreResult<Store> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.quiet_period.is_zero() {
            return Err(StoreError::Config("quiet period must be non-zero".into()));
        }

        let backend = match (self.mode, self.backend) {
            (PersistenceMode::Durable, Some(backend)) => Some(backend),
            (PersistenceMode::Durable, None) => {
                warn!("durable mode requested without a backend; running in pure-memory mode");
                None
            }
            (PersistenceMode::Memory, Some(backend)) => {
                debug!(backend = %backend.describe(), "memory mode; backend ignored");
                None
            }
            (PersistenceMode::Memory, None) => None,
        };

        let scheduler = Arc::new(FlushScheduler::new(
            backend,
            self.quiet_period,
            Handle::current(),
        ));
        let mut registry = Registry::new();
        for spec in self.specs {
            registry.register(spec, &scheduler);
        }

        let hydration = match scheduler.backend() {
            Some(backend) => hydrate(&registry, backend.as_ref()).await?,
            None => HydrationReport {
                loaded: Vec::new(),
                defaulted: registry.names().to_vec(),
            },
        };

        let store = Store {
            registry,
            scheduler,
            hydration,
        };
        info!(
            buckets = store.bucket_names().len(),
            durable = store.is_durable(),
            quiet_period_ms = store.quiet_period().as_millis() as u64,
            "store opened"
        );
        Ok(store)
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide bucket store.
///
/// Construct once at start-up with [`Store::builder`] and share by reference
/// (typically `Arc<Store>`) with whatever reads or writes buckets. Every
/// bucket exists exactly once; all handles to a name share one value.
pub struct Store {
    registry: Registry,
    scheduler: Arc<FlushScheduler>,
    hydration: HydrationReport,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Handle to the bucket called `name`.
    ///
    /// # Panics
    ///
    /// Panics if no such bucket is registered.
    pub fn bucket(&self, name: &str) -> Bucket {
        self.registry.get(name)
    }

    /// Typed handle to the mapping bucket called `name`.
    ///
    /// # Panics
    ///
    /// Panics if the bucket is unknown or is a sequence.
    pub fn mapping(&self, name: &str) -> Mapping {
        let bucket = self.bucket(name);
        assert_eq!(
            bucket.kind(),
            BucketKind::Mapping,
            "bucket {name:?} is not a mapping"
        );
        Mapping::new(bucket)
    }

    /// Typed handle to the sequence bucket called `name`.
    ///
    /// # Panics
    ///
    /// Panics if the bucket is unknown or is a mapping.
    pub fn sequence(&self, name: &str) -> Sequence {
        let bucket = self.bucket(name);
        assert_eq!(
            bucket.kind(),
            BucketKind::Sequence,
            "bucket {name:?} is not a sequence"
        );
        Sequence::new(bucket)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Registered names, in registration order.
    pub fn bucket_names(&self) -> &[String] {
        self.registry.names()
    }

    /// Handles to every bucket, in registration order.
    pub fn buckets(&self) -> Vec<Bucket> {
        self.registry
            .cells()
            .map(|cell| Bucket::from_cell(Arc::clone(cell)))
            .collect()
    }

    /// `false` in pure-memory mode.
    pub fn is_durable(&self) -> bool {
        self.scheduler.backend().is_some()
    }

    /// Where snapshots are written, if anywhere.
    pub fn backend_description(&self) -> Option<String> {
        self.scheduler.backend().map(|b| b.describe())
    }

    pub fn quiet_period(&self) -> Duration {
        self.scheduler.quiet_period()
    }

    /// What start-up hydration did.
    pub fn hydration(&self) -> &HydrationReport {
        &self.hydration
    }

    /// Names of buckets with unflushed mutations.
    pub fn pending(&self) -> Vec<String> {
        self.registry
            .cells()
            .filter(|cell| cell.flush.is_dirty())
            .map(|cell| cell.name().to_string())
            .collect()
    }

    /// Flush every bucket with a pending timer or an in-flight write now,
    /// without waiting for quiet periods. Returns when all writes finished.
    pub async fn drain_all(&self) -> DrainReport {
        let mut report = DrainReport::default();
        for cell in self.registry.cells() {
            match self.scheduler.drain(cell).await {
                DrainOutcome::Skipped => {}
                DrainOutcome::Flushed => report.flushed.push(cell.name().to_string()),
                DrainOutcome::Failed => report.failed.push(cell.name().to_string()),
            }
        }
        report
    }

    /// Drain before process exit.
    pub async fn shutdown(&self) -> DrainReport {
        let report = self.drain_all().await;
        if report.is_clean() {
            info!(flushed = report.flushed.len(), "store drained");
        } else {
            warn!(
                flushed = report.flushed.len(),
                failed = ?report.failed,
                "store drained with failures; unflushed state is lost"
            );
        }
        report
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("buckets", &self.bucket_names())
            .field("backend", &self.backend_description())
            .finish()
    }
}
