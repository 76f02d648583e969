//! Cross-store transactions.

mod cross_store;
mod state;

pub use cross_store::CrossStoreTransaction;
pub use state::{CommitReceipt, CrossStoreState};
