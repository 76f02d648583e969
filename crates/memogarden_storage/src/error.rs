//! Error types for store operations.

use crate::observer::TxnEvent;
use crate::store::StoreKind;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while operating a store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error occurred while preparing the store location.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bounded wait for exclusive access expired.
    #[error("timed out after {waited:?} waiting for exclusive access to the {store} store")]
    AcquisitionTimeout {
        /// Store that could not be acquired.
        store: StoreKind,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The transaction has already been committed or rolled back.
    #[error("{store} transaction is no longer open")]
    NotActive {
        /// Store the transaction belongs to.
        store: StoreKind,
    },

    /// A transaction observer vetoed the operation.
    #[error("{event} on the {store} store was rejected by an observer")]
    Injected {
        /// Store the operation targeted.
        store: StoreKind,
        /// The vetoed operation.
        event: TxnEvent,
    },

    /// The store file does not exist and creation was disabled.
    #[error("store not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: String,
    },
}

impl StorageError {
    /// Returns true if SQLite reported the database as busy or locked.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }

    /// Returns true if a retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AcquisitionTimeout { .. }) || self.is_busy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        let err = StorageError::AcquisitionTimeout {
            store: StoreKind::Soil,
            waited: Duration::from_millis(10),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("soil"));
    }

    #[test]
    fn injected_is_not_retryable() {
        let err = StorageError::Injected {
            store: StoreKind::Core,
            event: TxnEvent::Commit,
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "commit on the core store was rejected by an observer"
        );
    }
}
