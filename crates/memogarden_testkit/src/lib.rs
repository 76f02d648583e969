//! # MemoGarden Testkit
//!
//! Test utilities for MemoGarden.
//!
//! This crate provides:
//! - Coordinator fixtures over in-memory or temporary file stores
//! - Transaction observers that record call order or inject faults
//! - Helpers that damage stores the way crashes and bugs would
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use memogarden_testkit::prelude::*;
//! use memogarden_core::{NewEntity, StoreKind, TxnEvent};
//! use serde_json::json;
//!
//! let faults = FaultInjector::new();
//! let garden = TestGarden::builder().observer(faults.clone()).build();
//!
//! faults.fail_once(StoreKind::Core, TxnEvent::Commit);
//! assert!(garden.create_entity(NewEntity::new("Note", json!({}))).is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod damage;
pub mod fixtures;
pub mod generators;
pub mod observers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::damage::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::observers::*;
}

pub use damage::*;
pub use fixtures::*;
pub use generators::*;
pub use observers::*;
