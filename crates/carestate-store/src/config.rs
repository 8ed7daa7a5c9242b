use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use carestate_backend::{BackendTarget, SnapshotBackend};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Environment variable overriding [`StoreConfig::mode`].
pub const ENV_MODE: &str = "CARESTATE_STORE_MODE";
/// Environment variable overriding [`StoreConfig::target`].
pub const ENV_TARGET: &str = "CARESTATE_STORE_TARGET";
/// Environment variable overriding [`StoreConfig::quiet_period_ms`].
pub const ENV_QUIET_PERIOD_MS: &str = "CARESTATE_QUIET_PERIOD_MS";

/// Whether bucket state is mirrored to a durable backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// State lives only in memory and is lost on restart.
    #[default]
    Memory,
    /// State is hydrated from and flushed to the configured target.
    Durable,
}

impl FromStr for PersistenceMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "durable" => Ok(Self::Durable),
            other => Err(StoreError::Config(format!(
                "unknown persistence mode {other:?} (expected \"memory\" or \"durable\")"
            ))),
        }
    }
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Durable => write!(f, "durable"),
        }
    }
}

/// Store configuration, read once at process start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Requested persistence mode.
    pub mode: PersistenceMode,
    /// Connection target for the durable backend. Without one the store runs
    /// in pure-memory mode whatever `mode` says.
    pub target: Option<String>,
    /// Quiet period before a changed bucket is flushed.
    pub quiet_period_ms: u64,
}

impl StoreConfig {
    pub const DEFAULT_QUIET_PERIOD_MS: u64 = 150;
    pub const MAX_QUIET_PERIOD_MS: u64 = 60_000;

    /// A durable configuration pointing at `target`.
    pub fn durable(target: impl Into<String>) -> Self {
        Self {
            mode: PersistenceMode::Durable,
            target: Some(target.into()),
            ..Default::default()
        }
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> StoreResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `ENV_*` names.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(target) = lookup(ENV_TARGET) {
            let target = target.trim();
            self.target = (!target.is_empty()).then(|| target.to_string());
        }
        if let Some(ms) = lookup(ENV_QUIET_PERIOD_MS) {
            self.quiet_period_ms = ms.trim().parse().map_err(|e| {
                StoreError::Config(format!("{ENV_QUIET_PERIOD_MS}={ms:?}: {e}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.quiet_period_ms == 0 || self.quiet_period_ms > Self::MAX_QUIET_PERIOD_MS {
            return Err(StoreError::Config(format!(
                "quiet_period_ms must be in 1..={}, got {}",
                Self::MAX_QUIET_PERIOD_MS,
                self.quiet_period_ms
            )));
        }
        Ok(())
    }

    /// The parsed target, if durability is actually in effect.
    pub fn effective_target(&self) -> StoreResult<Option<BackendTarget>> {
        match (self.mode, self.target.as_deref()) {
            (PersistenceMode::Memory, _) => Ok(None),
            (PersistenceMode::Durable, None) => {
                warn!("durable mode requested without a target; running in pure-memory mode");
                Ok(None)
            }
            (PersistenceMode::Durable, Some(target)) => Ok(Some(BackendTarget::parse(target)?)),
        }
    }

    /// Open the durable backend, or `None` for pure-memory mode.
    pub fn resolve_backend(&self) -> StoreResult<Option<Arc<dyn SnapshotBackend>>> {
        self.effective_target()?
            .map(|target| target.open().map_err(StoreError::from))
            .transpose()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::default(),
            target: None,
            quiet_period_ms: Self::DEFAULT_QUIET_PERIOD_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.mode, PersistenceMode::Memory);
        assert!(c.target.is_none());
        assert_eq!(c.quiet_period(), Duration::from_millis(150));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn durable_without_target_is_pure_memory() {
        let c = StoreConfig {
            mode: PersistenceMode::Durable,
            target: None,
            ..Default::default()
        };
        assert!(c.effective_target().unwrap().is_none());
        assert!(c.resolve_backend().unwrap().is_none());
    }

    #[test]
    fn memory_mode_ignores_target() {
        let c = StoreConfig {
            mode: PersistenceMode::Memory,
            target: Some("memory:".into()),
            ..Default::default()
        };
        assert!(c.resolve_backend().unwrap().is_none());
    }

    #[test]
    fn durable_with_target_opens_backend() {
        let dir = tempfile::tempdir().unwrap();
        let c = StoreConfig::durable(format!("file:{}", dir.path().display()));
        let backend = c.resolve_backend().unwrap().expect("backend");
        assert!(backend.describe().starts_with("file:"));
    }

    #[test]
    fn unknown_target_scheme_is_rejected() {
        let c = StoreConfig::durable("redis://cache");
        assert!(matches!(c.resolve_backend(), Err(StoreError::Backend(_))));
    }

    #[test]
    fn overrides_apply() {
        let c = StoreConfig::default()
            .with_overrides(env(&[
                (ENV_MODE, "Durable"),
                (ENV_TARGET, "memory:"),
                (ENV_QUIET_PERIOD_MS, "200"),
            ]))
            .unwrap();
        assert_eq!(c.mode, PersistenceMode::Durable);
        assert_eq!(c.target.as_deref(), Some("memory:"));
        assert_eq!(c.quiet_period_ms, 200);
    }

    #[test]
    fn blank_target_override_clears_target() {
        let c = StoreConfig::durable("memory:")
            .with_overrides(env(&[(ENV_TARGET, "  ")]))
            .unwrap();
        assert!(c.target.is_none());
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        assert!(StoreConfig::default()
            .with_overrides(env(&[(ENV_MODE, "sometimes")]))
            .is_err());
        assert!(StoreConfig::default()
            .with_overrides(env(&[(ENV_QUIET_PERIOD_MS, "soon")]))
            .is_err());
        assert!(StoreConfig::default()
            .with_overrides(env(&[(ENV_QUIET_PERIOD_MS, "0")]))
            .is_err());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let c: StoreConfig =
            serde_json::from_str(r#"{"mode": "durable", "target": "./data"}"#).unwrap();
        assert_eq!(c.mode, PersistenceMode::Durable);
        assert_eq!(c.target.as_deref(), Some("./data"));
        assert_eq!(c.quiet_period_ms, StoreConfig::DEFAULT_QUIET_PERIOD_MS);
    }
}
