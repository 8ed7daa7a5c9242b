use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::names::validate_bucket_name;

/// Shape of a bucket's root value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// String key → arbitrary JSON value (a JSON object).
    Mapping,
    /// Ordered list of JSON values (a JSON array).
    Sequence,
}

impl BucketKind {
    /// The empty root value for this kind.
    pub fn empty_value(self) -> Value {
        match self {
            Self::Mapping => Value::Object(Map::new()),
            Self::Sequence => Value::Array(Vec::new()),
        }
    }

    /// Returns `true` if `value` has the root shape this kind requires.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Mapping => value.is_object(),
            Self::Sequence => value.is_array(),
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping => write!(f, "mapping"),
            Self::Sequence => write!(f, "sequence"),
        }
    }
}

/// Short JSON type name used in error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Registration record for one bucket.
///
/// A spec is validated on construction: the name must pass
/// [`validate_bucket_name`] and the default value must match the kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub kind: BucketKind,
    pub default: Value,
}

impl BucketSpec {
    /// Build a spec with an explicit default value.
    pub fn new(
        name: impl Into<String>,
        kind: BucketKind,
        default: Value,
    ) -> Result<Self, TypeError> {
        let name = name.into();
        validate_bucket_name(&name)?;
        if !kind.accepts(&default) {
            return Err(TypeError::KindMismatch {
                bucket: name,
                expected: kind,
                actual: json_type_name(&default).to_string(),
            });
        }
        Ok(Self {
            name,
            kind,
            default,
        })
    }

    /// An empty mapping bucket.
    pub fn mapping(name: impl Into<String>) -> Result<Self, TypeError> {
        Self::new(name, BucketKind::Mapping, BucketKind::Mapping.empty_value())
    }

    /// An empty sequence bucket.
    pub fn sequence(name: impl Into<String>) -> Result<Self, TypeError> {
        Self::new(name, BucketKind::Sequence, BucketKind::Sequence.empty_value())
    }
}
