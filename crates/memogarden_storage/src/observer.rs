//! Transaction lifecycle observation.

use crate::error::StorageResult;
use crate::store::StoreKind;
use std::fmt;

/// A transaction lifecycle operation on a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnEvent {
    /// `BEGIN EXCLUSIVE`.
    Begin,
    /// `COMMIT`.
    Commit,
    /// `ROLLBACK`.
    Rollback,
}

impl fmt::Display for TxnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Hook notified around every begin, commit and rollback a store performs.
///
/// `before` runs while the store lock is held and may veto the operation by
/// returning an error, which the store surfaces exactly as if SQLite had
/// failed. A vetoed commit is followed by the usual best-effort rollback.
///
/// Observers are the seam test doubles use to record call order and inject
/// faults; production stores usually run without one.
pub trait TxnObserver: Send + Sync {
    /// Called before `event` is issued against `store`.
    fn before(&self, store: StoreKind, event: TxnEvent) -> StorageResult<()> {
        let _ = (store, event);
        Ok(())
    }

    /// Called after `event` completed against `store`.
    fn after(&self, store: StoreKind, event: TxnEvent, succeeded: bool) {
        let _ = (store, event, succeeded);
    }
}
