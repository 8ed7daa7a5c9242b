use thiserror::Error;

use crate::bucket::BucketKind;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: String },

    #[error("bucket {bucket} expects a {expected} value, got {actual}")]
    KindMismatch {
        bucket: String,
        expected: BucketKind,
        actual: String,
    },
}
