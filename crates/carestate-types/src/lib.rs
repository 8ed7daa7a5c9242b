//! Foundation types for the Carestate bucket store.
//!
//! Every other Carestate crate depends on `carestate-types`. It carries the
//! vocabulary shared between the in-memory store and its durable backends.
//!
//! # Key Types
//!
//! - [`BucketKind`] -- Shape of a bucket's root value (mapping or sequence)
//! - [`BucketSpec`] -- Registration record: name, kind, and default value
//! - [`Snapshot`] -- Full JSON value of one bucket plus its `updated_at` stamp

pub mod bucket;
pub mod error;
pub mod names;
pub mod snapshot;

pub use bucket::{json_type_name, BucketKind, BucketSpec};
pub use error::TypeError;
pub use names::validate_bucket_name;
pub use snapshot::Snapshot;
