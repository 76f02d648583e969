//! Entity and fact data model.

mod entity;
mod fact;
mod id;
mod kind;
pub mod payload;

pub use entity::{Entity, EntityVersion, NewEntity};
pub use fact::{DeltaOperation, EntityDelta, Fact, NewFact, OWNER_KEY};
pub use id::{EntityUuid, FactUuid};
pub use kind::{EntityKind, FactKind};
pub use payload::TransactionData;
