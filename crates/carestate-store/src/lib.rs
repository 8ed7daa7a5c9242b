//! Mutation-tracked in-memory buckets with debounced durable write-back.
//!
//! A [`Store`] holds a fixed set of named buckets, each a JSON mapping or
//! sequence. Reads and writes are synchronous and always hit memory. Every
//! mutation, including one made through a nested [`View`], marks the bucket
//! dirty; after a quiet period with no further mutations the bucket's whole
//! value is upserted to the configured [`SnapshotBackend`].
//!
//! # Lifecycle
//!
//! 1. Register buckets on a [`StoreBuilder`].
//! 2. [`StoreBuilder::open`] hydrates them from the backend. A backend error
//!    here is fatal.
//! 3. Application code reads and writes through [`Mapping`], [`Sequence`],
//!    [`Bucket`], and [`View`] handles.
//! 4. [`Store::shutdown`] drains pending writes before exit.
//!
//! Without a backend (see [`PersistenceMode`]) the store runs in pure-memory
//! mode: nothing is scheduled and state is lost on restart.
//!
//! [`SnapshotBackend`]: carestate_backend::SnapshotBackend

pub mod config;
pub mod error;
pub mod handles;
pub mod hydrate;
pub mod pointer;
pub(crate) mod registry;
pub(crate) mod scheduler;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use config::{PersistenceMode, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use handles::{Mapping, Sequence};
pub use hydrate::HydrationReport;
pub use pointer::{parse_pointer, to_pointer};
pub use store::{DrainReport, Store, StoreBuilder};
pub use tracker::{Bucket, Field, View};
