use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The full value of one bucket at a point in time.
///
/// This is the durable record: one snapshot per bucket name, overwritten
/// wholesale on every upsert. Snapshots are never partial patches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Bucket name (unique key).
    pub bucket: String,
    /// Entire bucket value.
    pub data: Value,
    /// Set on every upsert.
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Stamp `data` with the current time.
    pub fn now(bucket: impl Into<String>, data: Value) -> Self {
        Self {
            bucket: bucket.into(),
            data,
            updated_at: Utc::now(),
        }
    }

    /// Returns `true` if both snapshots carry the same bucket and data,
    /// ignoring `updated_at`.
    pub fn same_content(&self, other: &Self) -> bool {
        self.bucket == other.bucket && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_content_ignores_timestamp() {
        let a = Snapshot::now("foo", json!({"x": "y"}));
        let mut b = a.clone();
        b.updated_at = a.updated_at + chrono::Duration::seconds(5);
        assert!(a.same_content(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn json_shape_has_three_fields() {
        let snap = Snapshot::now("foo", json!([1]));
        let v = serde_json::to_value(&snap).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["bucket"], "foo");
        assert_eq!(obj["data"], json!([1]));
        assert!(obj["updated_at"].is_string());
    }
}
