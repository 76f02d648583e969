//! SQLite-backed store handle.

use crate::error::{StorageError, StorageResult};
use crate::observer::{TxnEvent, TxnObserver};
use crate::txn::ExclusiveTxn;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which of the two stores a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// The append-only fact store.
    Soil,
    /// The mutable entity store.
    Core,
}

impl StoreKind {
    /// Returns the lowercase store name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Soil => "soil",
            Self::Core => "core",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-store options.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Upper bound on waiting for exclusive access.
    pub acquire_timeout: Duration,
    /// SQLite busy handler timeout, bounding waits on other processes.
    pub busy_timeout: Duration,
    /// Whether to create the store file if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }
}

impl StoreOptions {
    /// Sets the exclusive acquisition timeout.
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

    /// Sets whether to create missing store files.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}

/// A handle to one embedded store.
///
/// The handle owns a single SQLite connection. Every access, whether an
/// exclusive transaction or a plain read, goes through a bounded lock on that
/// connection, so a stuck writer delays other callers by at most
/// `acquire_timeout` before they see [`StorageError::AcquisitionTimeout`].
pub struct Store {
    kind: StoreKind,
    conn: Mutex<Connection>,
    options: StoreOptions,
    path: Option<PathBuf>,
    observer: Option<Arc<dyn TxnObserver>>,
}

impl Store {
    /// Opens a file-backed store.
    ///
    /// Parent directories are created when `create_if_missing` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing and creation is disabled, or
    /// if SQLite cannot open it.
    pub fn open(kind: StoreKind, path: &Path, options: StoreOptions) -> StorageResult<Self> {
        if !path.exists() {
            if !options.create_if_missing {
                return Err(StorageError::NotFound {
                    path: path.display().to_string(),
                });
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(options.busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(store = %kind, path = %path.display(), journal_mode = %mode, "opened store");

        Ok(Self {
            kind,
            conn: Mutex::new(conn),
            options,
            path: Some(path.to_path_buf()),
            observer: None,
        })
    }

    /// Opens an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory(kind: StoreKind, options: StoreOptions) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(options.busy_timeout)?;
        Ok(Self {
            kind,
            conn: Mutex::new(conn),
            options,
            path: None,
            observer: None,
        })
    }

    /// Attaches a lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TxnObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns which store this is.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Returns the store file, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the store options.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Begins a write-exclusive transaction.
    ///
    /// Waits at most `acquire_timeout` for the connection and then issues
    /// `BEGIN EXCLUSIVE`, whose own wait on other processes is bounded by the
    /// busy timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AcquisitionTimeout`] if either wait expires.
    pub fn begin_exclusive(&self) -> StorageResult<ExclusiveTxn<'_>> {
        let started = Instant::now();
        let conn = self.lock(started)?;
        match self.issue(&conn, TxnEvent::Begin) {
            Ok(()) => {
                tracing::trace!(store = %self.kind, "began exclusive transaction");
                Ok(ExclusiveTxn::new(self, conn))
            }
            Err(e) if e.is_busy() => Err(StorageError::AcquisitionTimeout {
                store: self.kind,
                waited: started.elapsed(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Runs `f` against the connection outside any exclusive transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AcquisitionTimeout`] if the connection stays
    /// busy for longer than `acquire_timeout`, or whatever `f` returns.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let conn = self.lock(Instant::now())?;
        f(&conn)
    }

    /// Executes a batch of schema statements.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn apply_schema(&self, sql: &str) -> StorageResult<()> {
        self.read(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Runs `PRAGMA quick_check` and returns every reported problem.
    ///
    /// An empty vector means the store passed.
    ///
    /// # Errors
    ///
    /// Returns an error if the check itself cannot run.
    pub fn integrity_check(&self) -> StorageResult<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("PRAGMA quick_check")?;
            let lines = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lines.into_iter().filter(|line| line != "ok").collect())
        })
    }

    fn lock(&self, started: Instant) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .try_lock_for(self.options.acquire_timeout)
            .ok_or_else(|| StorageError::AcquisitionTimeout {
                store: self.kind,
                waited: started.elapsed(),
            })
    }

    /// Issues a lifecycle statement, consulting the observer first.
    pub(crate) fn issue(&self, conn: &Connection, event: TxnEvent) -> StorageResult<()> {
        let sql = match event {
            TxnEvent::Begin => "BEGIN EXCLUSIVE",
            TxnEvent::Commit => "COMMIT",
            TxnEvent::Rollback => "ROLLBACK",
        };
        let result = match &self.observer {
            Some(observer) => observer.before(self.kind, event),
            None => Ok(()),
        }
        .and_then(|()| conn.execute_batch(sql).map_err(StorageError::from));

        if let Some(observer) = &self.observer {
            observer.after(self.kind, event, result.is_ok());
        }
        result
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}
