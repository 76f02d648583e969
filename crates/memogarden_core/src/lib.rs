//! # MemoGarden Core
//!
//! Cross-store transaction coordination for MemoGarden.
//!
//! MemoGarden keeps two SQLite stores: **Soil**, an append-only log of
//! immutable facts, and **Core**, mutable entities whose versions form a
//! SHA-256 hash chain. This crate provides:
//!
//! - the entity and fact model, with optimistic locking on the entity hash
//! - repositories over each store
//! - [`CrossStoreTransaction`], which holds both stores and commits Soil
//!   before Core
//! - [`Coordinator`], which gates cross-store writes on the [`SystemStatus`]
//! - [`ConsistencyChecker`], which finds orphaned facts and broken chains
//!
//! ## Example
//!
//! ```rust
//! use memogarden_core::{Config, Coordinator, NewEntity, SystemStatus};
//! use serde_json::json;
//!
//! let garden = Coordinator::open(Config::default()).unwrap();
//! assert_eq!(garden.status(), SystemStatus::Normal);
//!
//! let note = garden
//!     .create_entity(NewEntity::new("Note", json!({"text": "plant tomatoes"})))
//!     .unwrap();
//! let edited = garden
//!     .edit_entity(note.uuid, json!({"text": "plant basil"}), note.lock_token())
//!     .unwrap();
//! assert_eq!(edited.previous_hash, Some(note.hash));
//! assert!(garden.verify_entity_chain(note.uuid).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checker;
mod config;
mod coordinator;
mod error;
pub mod hash;
pub mod model;
pub mod repo;
mod status;
mod transaction;
mod types;

pub use checker::{classify, ConsistencyChecker, ConsistencyReport, Finding};
pub use config::{
    Config, StoreLocation, ENV_ACQUIRE_TIMEOUT_MS, ENV_BUSY_TIMEOUT_MS, ENV_CORE_DB,
    ENV_ORPHAN_PROBE_BATCH, ENV_SOIL_DB,
};
pub use coordinator::{Coordinator, Supersession};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use model::{
    DeltaOperation, Entity, EntityDelta, EntityKind, EntityUuid, EntityVersion, Fact, FactKind,
    FactUuid, NewEntity, NewFact, TransactionData,
};
pub use status::{HealthReport, SystemStatus};
pub use transaction::{CommitReceipt, CrossStoreState, CrossStoreTransaction};
pub use types::{ContentHash, LockToken, Timestamp, TransactionId, Version, HASH_LEN};

pub use memogarden_storage::{Store, StoreKind, StoreOptions, TxnEvent, TxnObserver};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
