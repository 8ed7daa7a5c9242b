//! Bucket name validation.
//!
//! Bucket names double as durable keys (a database row key, a file stem), so
//! they are restricted to a conservative alphabet:
//! - Must be non-empty and at most [`MAX_BUCKET_NAME_LEN`] bytes
//! - ASCII letters, digits, `_` and `-` only
//! - Must start with a letter

use crate::error::TypeError;

/// Longest accepted bucket name, in bytes.
pub const MAX_BUCKET_NAME_LEN: usize = 64;

/// Validate a bucket name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use carestate_types::validate_bucket_name;
///
/// assert!(validate_bucket_name("appointments").is_ok());
/// assert!(validate_bucket_name("video_rooms").is_ok());
/// assert!(validate_bucket_name("").is_err());
/// assert!(validate_bucket_name("../etc").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_BUCKET_NAME_LEN {
        return Err(invalid("too long"));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid("must start with an ASCII letter"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}
