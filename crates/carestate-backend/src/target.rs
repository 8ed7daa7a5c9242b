use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BackendError, BackendResult};
use crate::file::FileSnapshotBackend;
use crate::memory::InMemorySnapshotBackend;
use crate::traits::SnapshotBackend;

/// A parsed connection target.
///
/// Accepted forms:
/// - `memory:` -- process-local [`InMemorySnapshotBackend`]
/// - `file:<dir>` -- [`FileSnapshotBackend`] rooted at `<dir>`
/// - `<dir>` -- a bare path, same as `file:<dir>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendTarget {
    Memory,
    Directory(PathBuf),
}

impl BackendTarget {
    /// Parse a connection target string.
    pub fn parse(target: &str) -> BackendResult<Self> {
        let trimmed = target.trim();
        let invalid = |reason: &str| BackendError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty target"));
        }
        if trimmed == "memory:" {
            return Ok(Self::Memory);
        }
        if let Some(path) = trimmed.strip_prefix("file:") {
            let path = path.strip_prefix("//").unwrap_or(path);
            if path.is_empty() {
                return Err(invalid("file target needs a directory"));
            }
            return Ok(Self::Directory(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(invalid(&format!("unsupported scheme {scheme:?}")));
        }
        Ok(Self::Directory(PathBuf::from(trimmed)))
    }

    /// Open the backend this target names.
    pub fn open(&self) -> BackendResult<Arc<dyn SnapshotBackend>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemorySnapshotBackend::new())),
            Self::Directory(root) => Ok(Arc::new(FileSnapshotBackend::open(root)?)),
        }
    }
}

impl FromStr for BackendTarget {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory:"),
            Self::Directory(root) => write!(f, "file:{}", root.display()),
        }
    }
}
