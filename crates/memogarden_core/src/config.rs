//! Coordinator configuration.

use crate::error::{CoreError, CoreResult};
use memogarden_storage::StoreOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the Soil database file.
pub const ENV_SOIL_DB: &str = "MEMOGARDEN_SOIL_DB";
/// Environment variable naming the Core database file.
pub const ENV_CORE_DB: &str = "MEMOGARDEN_CORE_DB";
/// Environment variable overriding [`Config::acquire_timeout`], in milliseconds.
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "MEMOGARDEN_ACQUIRE_TIMEOUT_MS";
/// Environment variable overriding [`Config::busy_timeout`], in milliseconds.
pub const ENV_BUSY_TIMEOUT_MS: &str = "MEMOGARDEN_BUSY_TIMEOUT_MS";
/// Environment variable overriding [`Config::orphan_probe_batch`].
pub const ENV_ORPHAN_PROBE_BATCH: &str = "MEMOGARDEN_ORPHAN_PROBE_BATCH";

/// Where a store lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreLocation {
    /// A private in-memory database.
    #[default]
    Memory,
    /// A database file.
    File(PathBuf),
}

impl StoreLocation {
    /// Returns the file path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File(path) => Some(path),
        }
    }
}

/// Configuration for opening a [`crate::Coordinator`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the Soil (facts) store.
    pub soil: StoreLocation,

    /// Location of the Core (entities) store.
    pub core: StoreLocation,

    /// Bounded wait for exclusive access to either store.
    pub acquire_timeout: Duration,

    /// SQLite busy handler timeout for file locks held by other processes.
    pub busy_timeout: Duration,

    /// Whether to create missing database files.
    pub create_if_missing: bool,

    /// Entity UUIDs probed per query during the orphan scan.
    pub orphan_probe_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            soil: StoreLocation::Memory,
            core: StoreLocation::Memory,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            orphan_probe_batch: 256,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the Soil database at `path`.
    #[must_use]
    pub fn soil_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.soil = StoreLocation::File(path.into());
        self
    }

    /// Stores the Core database at `path`.
    #[must_use]
    pub fn core_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.core = StoreLocation::File(path.into());
        self
    }

    /// Places both databases in `dir` as `soil.db` and `core.db`.
    #[must_use]
    pub fn in_dir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.soil_path(dir.join("soil.db"))
            .core_path(dir.join("core.db"))
    }

    /// Sets the bounded wait for exclusive access.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to create missing database files.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets how many entity UUIDs the orphan scan probes per query.
    #[must_use]
    pub const fn orphan_probe_batch(mut self, batch: usize) -> Self {
        self.orphan_probe_batch = batch;
        self
    }

    /// Returns the per-store options.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .acquire_timeout(self.acquire_timeout)
            .busy_timeout(self.busy_timeout)
            .create_if_missing(self.create_if_missing)
    }

    /// Layers `MEMOGARDEN_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for unparseable values.
    pub fn from_env() -> CoreResult<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Layers overrides from `lookup` over this configuration.
    ///
    /// `lookup` is consulted with the same keys as [`Config::from_env`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for unparseable values.
    pub fn with_overrides<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_SOIL_DB).filter(|v| !v.is_empty()) {
            self = self.soil_path(path);
        }
        if let Some(path) = lookup(ENV_CORE_DB).filter(|v| !v.is_empty()) {
            self = self.core_path(path);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_ACQUIRE_TIMEOUT_MS)? {
            self.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_BUSY_TIMEOUT_MS)? {
            self.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(batch) = parse_var::<usize>(&lookup, ENV_ORPHAN_PROBE_BATCH)? {
            if batch == 0 {
                return Err(CoreError::invalid_config(format!(
                    "{ENV_ORPHAN_PROBE_BATCH} must be at least 1"
                )));
            }
            self.orphan_probe_batch = batch;
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> CoreResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            CoreError::invalid_config(format!("{key} must be a non-negative integer, got {raw:?}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.soil, StoreLocation::Memory);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.orphan_probe_batch, 256);
        assert!(config.create_if_missing);
    }

    #[test]
    fn builder_sets_fields() {
        let config = Config::new()
            .in_dir("/tmp/garden")
            .acquire_timeout(Duration::from_millis(50))
            .orphan_probe_batch(8);
        assert_eq!(config.soil.path(), Some(Path::new("/tmp/garden/soil.db")));
        assert_eq!(config.core.path(), Some(Path::new("/tmp/garden/core.db")));
        assert_eq!(config.store_options().acquire_timeout, Duration::from_millis(50));
        assert_eq!(config.orphan_probe_batch, 8);
    }

    #[test]
    fn overrides_apply() {
        let config = Config::default()
            .with_overrides(lookup(&[
                (ENV_SOIL_DB, "/data/soil.db"),
                (ENV_ACQUIRE_TIMEOUT_MS, "250"),
                (ENV_ORPHAN_PROBE_BATCH, "32"),
            ]))
            .unwrap();
        assert_eq!(config.soil.path(), Some(Path::new("/data/soil.db")));
        assert_eq!(config.core, StoreLocation::Memory);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.orphan_probe_batch, 32);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = Config::default()
            .with_overrides(lookup(&[(ENV_BUSY_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
        assert!(err.to_string().contains(ENV_BUSY_TIMEOUT_MS));

        let err = Config::default()
            .with_overrides(lookup(&[(ENV_ORPHAN_PROBE_BATCH, "0")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }
}
