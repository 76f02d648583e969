//! Coordinator fixtures.
//!
//! Provides convenience functions for setting up a coordinator over fresh
//! stores, optionally observed and optionally file-backed.

use memogarden_core::{Config, Coordinator, Store, StoreKind, StoreOptions, TxnObserver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A coordinator over test stores, with automatic cleanup.
pub struct TestGarden {
    /// The coordinator instance.
    pub coordinator: Coordinator,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestGarden {
    /// Creates a coordinator over two in-memory stores.
    pub fn memory() -> Self {
        Self::builder().build()
    }

    /// Creates a coordinator over two files in a temporary directory.
    pub fn file() -> Self {
        Self::builder().file().build()
    }

    /// Starts configuring a test coordinator.
    #[must_use]
    pub fn builder() -> TestGardenBuilder {
        TestGardenBuilder::default()
    }

    /// Returns the directory holding the store files, if file-backed.
    pub fn dir(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the coordinator and opens a new one over the same files.
    ///
    /// The new coordinator runs its own startup check.
    ///
    /// # Panics
    ///
    /// Panics if the garden is in-memory.
    pub fn reopen(self) -> Self {
        let temp_dir = self
            ._temp_dir
            .expect("only file-backed gardens can be reopened");
        let config = self.coordinator.config().clone();
        drop(self.coordinator);
        Self {
            coordinator: Coordinator::open(config).expect("Failed to reopen coordinator"),
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestGarden {
    type Target = Coordinator;

    fn deref(&self) -> &Self::Target {
        &self.coordinator
    }
}

/// Builder for [`TestGarden`].
#[derive(Default)]
pub struct TestGardenBuilder {
    file: bool,
    observer: Option<Arc<dyn TxnObserver>>,
    acquire_timeout: Option<Duration>,
}

impl TestGardenBuilder {
    /// Backs both stores with files in a temporary directory.
    #[must_use]
    pub fn file(mut self) -> Self {
        self.file = true;
        self
    }

    /// Attaches `observer` to both stores.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn TxnObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Overrides the exclusive-access wait.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Opens the stores and the coordinator.
    ///
    /// # Panics
    ///
    /// Panics if any store cannot be opened.
    pub fn build(self) -> TestGarden {
        let temp_dir = self
            .file
            .then(|| TempDir::new().expect("Failed to create temp directory"));

        let mut config = Config::default();
        if let Some(dir) = &temp_dir {
            config = config.in_dir(dir.path());
        }
        if let Some(timeout) = self.acquire_timeout {
            config = config.acquire_timeout(timeout);
        }

        let soil = open(StoreKind::Soil, config.soil.path(), &config, &self.observer);
        let core = open(StoreKind::Core, config.core.path(), &config, &self.observer);
        TestGarden {
            coordinator: Coordinator::with_stores(soil, core, config)
                .expect("Failed to open coordinator"),
            _temp_dir: temp_dir,
        }
    }
}

fn open(
    kind: StoreKind,
    path: Option<&Path>,
    config: &Config,
    observer: &Option<Arc<dyn TxnObserver>>,
) -> Store {
    let options: StoreOptions = config.store_options();
    let store = match path {
        Some(path) => Store::open(kind, path, options),
        None => Store::open_in_memory(kind, options),
    }
    .expect("Failed to open store");
    match observer {
        Some(observer) => store.with_observer(Arc::clone(observer)),
        None => store,
    }
}

/// Returns the paths a file-backed garden in `dir` uses.
pub fn store_paths(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join("soil.db"), dir.join("core.db"))
}

/// Runs a test with a fresh in-memory coordinator.
///
/// # Example
///
/// ```rust
/// use memogarden_testkit::with_garden;
/// use memogarden_core::SystemStatus;
///
/// with_garden(|garden| {
///     assert_eq!(garden.status(), SystemStatus::Normal);
/// });
/// ```
pub fn with_garden<F, R>(f: F) -> R
where
    F: FnOnce(&Coordinator) -> R,
{
    let garden = TestGarden::memory();
    f(&garden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memogarden_core::SystemStatus;

    #[test]
    fn file_garden_uses_temp_dir() {
        let garden = TestGarden::file();
        let dir = garden.dir().unwrap().to_path_buf();
        let (soil, core) = store_paths(&dir);
        assert!(soil.exists());
        assert!(core.exists());
        assert_eq!(garden.status(), SystemStatus::Normal);
    }

    #[test]
    fn memory_garden_has_no_dir() {
        assert!(TestGarden::memory().dir().is_none());
    }
}
