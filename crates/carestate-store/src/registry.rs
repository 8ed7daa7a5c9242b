//! The fixed catalog of buckets for one process.

use std::collections::HashMap;
use std::sync::Arc;

use carestate_types::BucketSpec;

use crate::scheduler::FlushScheduler;
use crate::tracker::{Bucket, BucketCell};

/// Owns exactly one [`BucketCell`] per registered name.
///
/// Registration happens once, before any handle is handed out. Registering a
/// name twice or asking for an unknown name is a programming error and
/// panics.
pub(crate) struct Registry {
    cells: HashMap<String, Arc<BucketCell>>,
    /// Registration order, for stable iteration.
    order: Vec<String>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            cells: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, spec: BucketSpec, scheduler: &Arc<FlushScheduler>) -> Bucket {
        assert!(
            !self.cells.contains_key(&spec.name),
            "bucket {:?} registered twice",
            spec.name
        );
        let cell = Arc::new(BucketCell::new(
            spec.name.clone(),
            spec.kind,
            spec.default,
            Arc::clone(scheduler),
        ));
        self.order.push(spec.name.clone());
        self.cells.insert(spec.name, Arc::clone(&cell));
        Bucket::from_cell(cell)
    }

    pub(crate) fn get(&self, name: &str) -> Bucket {
        match self.cells.get(name) {
            Some(cell) => Bucket::from_cell(Arc::clone(cell)),
            None => panic!("unknown bucket {name:?}; registered: {:?}", self.order),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.order
    }

    /// Cells in registration order.
    pub(crate) fn cells(&self) -> impl Iterator<Item = &Arc<BucketCell>> + '_ {
        self.order.iter().filter_map(|name| self.cells.get(name))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::runtime::Handle;

    use super::*;

    fn scheduler() -> Arc<FlushScheduler> {
        Arc::new(FlushScheduler::new(None, Duration::from_millis(150), Handle::current()))
    }

    #[tokio::test]
    async fn register_then_get_returns_same_bucket() {
        let scheduler = scheduler();
        let mut registry = Registry::new();
        let users = registry.register(BucketSpec::mapping("users").unwrap(), &scheduler);
        registry.register(BucketSpec::sequence("messages").unwrap(), &scheduler);

        assert!(users.ptr_eq(&registry.get("users")));
        assert!(registry.get("users").ptr_eq(&registry.get("users")));
        assert_eq!(registry.names(), ["users", "messages"]);
        assert_eq!(registry.cells().count(), 2);
        assert!(registry.contains("messages"));
        assert!(!registry.contains("doctors"));
    }

    #[tokio::test]
    async fn default_value_is_installed() {
        let scheduler = scheduler();
        let mut registry = Registry::new();
        let spec = BucketSpec::new(
            "doctors",
            carestate_types::BucketKind::Mapping,
            json!({"d1": {"name": "Dr. Osei"}}),
        )
        .unwrap();
        let doctors = registry.register(spec, &scheduler);
        assert_eq!(doctors.snapshot()["d1"]["name"], "Dr. Osei");
    }

    #[tokio::test]
    #[should_panic(expected = "registered twice")]
    async fn double_registration_panics() {
        let scheduler = scheduler();
        let mut registry = Registry::new();
        registry.register(BucketSpec::mapping("users").unwrap(), &scheduler);
        registry.register(BucketSpec::sequence("users").unwrap(), &scheduler);
    }

    #[tokio::test]
    #[should_panic(expected = "unknown bucket")]
    async fn unknown_bucket_panics() {
        let registry = Registry::new();
        registry.get("ghost");
    }
}
