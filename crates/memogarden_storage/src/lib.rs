//! # MemoGarden Storage
//!
//! Store handles for the two embedded SQLite stores MemoGarden keeps:
//! the append-only **Soil** (facts) and the mutable **Core** (entities).
//!
//! This crate knows nothing about entities, facts or hash chains. It only
//! provides the transaction contract the coordinator relies on:
//!
//! - `begin_exclusive` acquires a write-exclusive transaction with a bounded
//!   wait and fails with [`StorageError::AcquisitionTimeout`] instead of
//!   blocking forever
//! - `commit` and `rollback` end the transaction and are no-ops when called
//!   again on an already-ended transaction
//! - dropping an open transaction rolls it back
//!
//! ## Example
//!
//! ```rust
//! use memogarden_storage::{Store, StoreKind, StoreOptions};
//!
//! let store = Store::open_in_memory(StoreKind::Core, StoreOptions::default()).unwrap();
//! store.apply_schema("CREATE TABLE t (v INTEGER);").unwrap();
//!
//! let mut txn = store.begin_exclusive().unwrap();
//! txn.connection().unwrap().execute("INSERT INTO t (v) VALUES (1)", []).unwrap();
//! txn.commit().unwrap();
//! txn.commit().unwrap(); // no-op
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod observer;
mod store;
mod txn;

pub use error::{StorageError, StorageResult};
pub use observer::{TxnEvent, TxnObserver};
pub use store::{Store, StoreKind, StoreOptions};
pub use txn::{ExclusiveTxn, TxnState};

/// Re-exported so callers can name connection and row types without a
/// direct `rusqlite` dependency.
pub use rusqlite;
