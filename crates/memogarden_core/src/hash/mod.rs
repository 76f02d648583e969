//! Hash-chain engine.
//!
//! Every entity version carries `hash = sha256(canonical(data) ++ previous)`.
//! Optimistic locking compares the hash a caller last read against the
//! current one; the chain lets the checker prove no version was lost or
//! rewritten.

mod canonical;
mod chain;

pub use canonical::{to_canonical_json, CanonicalWriter};
pub use chain::{compute_hash, find_chain_break, verify_chain, BreakKind, ChainBreak, ChainRecord};
