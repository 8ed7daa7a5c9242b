//! Durable snapshot storage for the Carestate bucket store.
//!
//! A backend persists exactly one [`Snapshot`] per bucket name. The store
//! never sends partial patches: every upsert carries the whole bucket value,
//! so backends need no merge logic and every operation is idempotent.
//!
//! # Storage Backends
//!
//! All backends implement the [`SnapshotBackend`] trait:
//!
//! - [`InMemorySnapshotBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`FileSnapshotBackend`] -- one JSON file per bucket, atomically replaced
//!
//! [`BackendTarget`] parses a connection target string (`memory:`,
//! `file:<dir>`, or a bare directory path) and opens the matching backend.
//!
//! [`Snapshot`]: carestate_types::Snapshot

pub mod error;
pub mod file;
pub mod memory;
pub mod target;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use file::FileSnapshotBackend;
pub use memory::InMemorySnapshotBackend;
pub use target::BackendTarget;
pub use traits::SnapshotBackend;
