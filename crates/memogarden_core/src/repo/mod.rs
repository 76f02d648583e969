//! Entity and fact repositories.
//!
//! Repositories borrow a connection and never manage transactions; the
//! cross-store transaction owns begin/commit/rollback.

mod codec;
mod entity;
mod fact;
pub mod schema;

pub use entity::EntityRepo;
pub use fact::{FactRepo, OwnerReference};
pub use schema::{ensure_schema, CORE_SCHEMA, SOIL_SCHEMA};
