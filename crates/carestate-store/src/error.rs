use carestate_backend::BackendError;
use carestate_types::TypeError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The durable backend could not be read at start-up.
    #[error("hydration from {backend} failed: {source}")]
    Hydration {
        backend: String,
        source: BackendError,
    },

    /// Backend failure outside hydration (opening a target, inspection).
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// A bucket spec or a stored snapshot has the wrong shape.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// Invalid store configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A tracked view points at a location that no longer exists.
    #[error("no value at {pointer} in bucket {bucket}")]
    PathNotFound { bucket: String, pointer: String },

    /// A tracked view indexes into an array whose elements were removed or
    /// rewritten after the view was taken, so its path may now name a
    /// different element.
    #[error("view of {pointer} in bucket {bucket} is stale: the array it indexes was reshaped")]
    StaleView { bucket: String, pointer: String },

    /// A tracked view points at a primitive where a container is required.
    #[error("value at {pointer} in bucket {bucket} is a {found}, not an object or array")]
    NotAContainer {
        bucket: String,
        pointer: String,
        found: &'static str,
    },

    /// An array key is not a valid index.
    #[error("invalid array index {key:?} at {pointer} in bucket {bucket}")]
    InvalidIndex {
        bucket: String,
        pointer: String,
        key: String,
    },

    /// An array index is past the end of the array.
    #[error("index {index} out of range (len {len}) at {pointer} in bucket {bucket}")]
    IndexOutOfRange {
        bucket: String,
        pointer: String,
        index: usize,
        len: usize,
    },

    /// Serialization or deserialization of a typed value failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
