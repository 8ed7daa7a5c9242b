//! Start-up load of durable snapshots into registered buckets.

use std::collections::HashMap;

use carestate_backend::SnapshotBackend;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::registry::Registry;

/// Which buckets were replaced by a stored snapshot and which kept their
/// defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub loaded: Vec<String>,
    pub defaulted: Vec<String>,
}

/// Replace each registered bucket's default with its stored snapshot.
///
/// Any backend error is fatal: starting with defaults while a backend is
/// configured would hide data loss.
pub(crate) async fn hydrate(
    registry: &Registry,
    backend: &dyn SnapshotBackend,
) -> StoreResult<HydrationReport> {
    let mut snapshots: HashMap<_, _> = backend
        .load_all(registry.names())
        .await
        .map_err(|source| StoreError::Hydration {
            backend: backend.describe(),
            source,
        })?;

    let mut report = HydrationReport::default();
    for cell in registry.cells() {
        match snapshots.remove(cell.name()) {
            Some(snapshot) => {
                cell.reload(snapshot.data)?;
                debug!(bucket = %cell.name(), updated_at = %snapshot.updated_at, "bucket hydrated");
                report.loaded.push(cell.name().to_string());
            }
            None => report.defaulted.push(cell.name().to_string()),
        }
    }

    info!(
        backend = %backend.describe(),
        loaded = report.loaded.len(),
        defaulted = report.defaulted.len(),
        "hydration complete"
    );
    Ok(report)
}
