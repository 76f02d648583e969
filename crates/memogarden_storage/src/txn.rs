//! Exclusive transaction handle.

use crate::error::{StorageError, StorageResult};
use crate::observer::TxnEvent;
use crate::store::{Store, StoreKind};
use parking_lot::MutexGuard;
use rusqlite::Connection;
use std::fmt;

/// Lifecycle state of an [`ExclusiveTxn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Writes may be issued.
    Open,
    /// All writes were durably persisted.
    Committed,
    /// All writes were discarded.
    RolledBack,
}

/// A write-exclusive transaction on one store.
///
/// Holds the store's connection for its whole lifetime. A transaction runs
/// exactly one begin/commit-or-rollback cycle; once it has ended, further
/// `commit` or `rollback` calls return `Ok(())` without touching the store,
/// so recovery paths may call them unconditionally.
pub struct ExclusiveTxn<'a> {
    store: &'a Store,
    conn: MutexGuard<'a, Connection>,
    state: TxnState,
}

impl<'a> ExclusiveTxn<'a> {
    pub(crate) fn new(store: &'a Store, conn: MutexGuard<'a, Connection>) -> Self {
        Self {
            store,
            conn,
            state: TxnState::Open,
        }
    }

    /// Returns which store this transaction runs against.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Checks if the transaction still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TxnState::Open
    }

    /// Returns the connection for issuing reads and writes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotActive`] once the transaction has ended.
    pub fn connection(&self) -> StorageResult<&Connection> {
        if self.is_open() {
            Ok(&self.conn)
        } else {
            Err(StorageError::NotActive { store: self.kind() })
        }
    }

    /// Durably persists all writes.
    ///
    /// If the commit fails the writes are rolled back and the transaction
    /// ends in [`TxnState::RolledBack`].
    ///
    /// # Errors
    ///
    /// Returns the commit failure. Calling `commit` on an ended transaction
    /// is a no-op.
    pub fn commit(&mut self) -> StorageResult<()> {
        if !self.is_open() {
            tracing::debug!(store = %self.kind(), state = ?self.state, "commit on ended transaction ignored");
            return Ok(());
        }

        match self.store.issue(&self.conn, TxnEvent::Commit) {
            Ok(()) => {
                self.state = TxnState::Committed;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = self.discard() {
                    tracing::warn!(store = %self.kind(), error = %rollback_err, "rollback after failed commit also failed");
                }
                Err(e)
            }
        }
    }

    /// Discards all writes.
    ///
    /// The transaction ends in [`TxnState::RolledBack`] even when the
    /// rollback statement fails.
    ///
    /// # Errors
    ///
    /// Returns the rollback failure. Calling `rollback` on an ended
    /// transaction is a no-op.
    pub fn rollback(&mut self) -> StorageResult<()> {
        if !self.is_open() {
            tracing::debug!(store = %self.kind(), state = ?self.state, "rollback on ended transaction ignored");
            return Ok(());
        }
        self.discard()
    }

    fn discard(&mut self) -> StorageResult<()> {
        let result = self.store.issue(&self.conn, TxnEvent::Rollback);
        self.state = TxnState::RolledBack;
        // Never hand the connection back mid-transaction, or the next
        // BEGIN on this store would fail.
        if !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(store = %self.kind(), error = %e, "could not return connection to autocommit");
            }
        }
        result
    }
}

impl Drop for ExclusiveTxn<'_> {
    fn drop(&mut self) {
        if self.is_open() {
            tracing::debug!(store = %self.kind(), "rolling back transaction dropped while open");
            if let Err(e) = self.discard() {
                tracing::warn!(store = %self.kind(), error = %e, "rollback on drop failed");
            }
        }
    }
}

impl fmt::Debug for ExclusiveTxn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveTxn")
            .field("store", &self.kind())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TxnObserver;
    use crate::store::StoreOptions;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Veto {
        event: Option<TxnEvent>,
        seen: Mutex<Vec<(TxnEvent, bool)>>,
    }

    impl TxnObserver for Veto {
        fn before(&self, store: StoreKind, event: TxnEvent) -> StorageResult<()> {
            if self.event == Some(event) {
                return Err(StorageError::Injected { store, event });
            }
            Ok(())
        }

        fn after(&self, _store: StoreKind, event: TxnEvent, succeeded: bool) {
            self.seen.lock().push((event, succeeded));
        }
    }

    fn store_with(observer: Arc<Veto>) -> Store {
        let store = Store::open_in_memory(StoreKind::Core, StoreOptions::default())
            .unwrap()
            .with_observer(observer);
        store
            .apply_schema("CREATE TABLE items (v INTEGER NOT NULL);")
            .unwrap();
        store
    }

    fn count(store: &Store) -> i64 {
        store
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))
                    .map_err(StorageError::from)
            })
            .unwrap()
    }

    #[test]
    fn double_commit_is_noop() {
        let store = store_with(Arc::new(Veto::default()));
        let mut txn = store.begin_exclusive().unwrap();
        txn.commit().unwrap();
        txn.commit().unwrap();
        txn.rollback().unwrap();
        assert_eq!(txn.state(), TxnState::Committed);
    }

    #[test]
    fn double_rollback_is_noop() {
        let store = store_with(Arc::new(Veto::default()));
        let mut txn = store.begin_exclusive().unwrap();
        txn.rollback().unwrap();
        txn.rollback().unwrap();
        txn.commit().unwrap();
        assert_eq!(txn.state(), TxnState::RolledBack);
    }

    #[test]
    fn connection_unavailable_after_end() {
        let store = store_with(Arc::new(Veto::default()));
        let mut txn = store.begin_exclusive().unwrap();
        txn.commit().unwrap();
        assert!(matches!(
            txn.connection(),
            Err(StorageError::NotActive {
                store: StoreKind::Core
            })
        ));
    }

    #[test]
    fn failed_commit_rolls_back() {
        let observer = Arc::new(Veto {
            event: Some(TxnEvent::Commit),
            ..Veto::default()
        });
        let store = store_with(Arc::clone(&observer));

        let mut txn = store.begin_exclusive().unwrap();
        txn.connection()
            .unwrap()
            .execute("INSERT INTO items (v) VALUES (7)", [])
            .unwrap();
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, StorageError::Injected { .. }));
        assert_eq!(txn.state(), TxnState::RolledBack);
        drop(txn);

        assert_eq!(count(&store), 0);
        assert_eq!(
            *observer.seen.lock(),
            vec![
                (TxnEvent::Begin, true),
                (TxnEvent::Commit, false),
                (TxnEvent::Rollback, true),
            ]
        );
    }

    #[test]
    fn vetoed_rollback_still_discards_writes() {
        let observer = Arc::new(Veto {
            event: Some(TxnEvent::Rollback),
            ..Veto::default()
        });
        let store = store_with(observer);

        let mut txn = store.begin_exclusive().unwrap();
        txn.connection()
            .unwrap()
            .execute("INSERT INTO items (v) VALUES (7)", [])
            .unwrap();
        assert!(txn.rollback().is_err());
        drop(txn);

        assert_eq!(count(&store), 0);
        // The connection is usable again.
        let mut next = store.begin_exclusive().unwrap();
        next.commit().unwrap();
    }
}
