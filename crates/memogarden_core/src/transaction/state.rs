//! Cross-store transaction state.

use crate::model::{EntityUuid, FactUuid};
use crate::types::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a cross-store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossStoreState {
    /// Both stores held exclusively; writes accepted.
    Open,
    /// Commit in progress.
    Committing,
    /// Both stores committed.
    Committed,
    /// Ended without committing both stores.
    Aborted,
}

impl CrossStoreState {
    /// Returns true once the transaction can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for CrossStoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What a finished transaction wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// The transaction.
    pub txn: TransactionId,
    /// Final state; `Aborted` when commit is called on a rolled-back handle.
    pub outcome: CrossStoreState,
    /// Facts appended, in write order.
    pub facts: Vec<FactUuid>,
    /// Entities written, in write order.
    pub entities: Vec<EntityUuid>,
}

impl CommitReceipt {
    /// Returns true if both stores committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.outcome == CrossStoreState::Committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!CrossStoreState::Open.is_terminal());
        assert!(!CrossStoreState::Committing.is_terminal());
        assert!(CrossStoreState::Committed.is_terminal());
        assert!(CrossStoreState::Aborted.is_terminal());
    }

    #[test]
    fn receipt_outcome() {
        let receipt = CommitReceipt {
            txn: TransactionId::new(1),
            outcome: CrossStoreState::Aborted,
            facts: Vec::new(),
            entities: Vec::new(),
        };
        assert!(!receipt.is_committed());
        assert_eq!(receipt.outcome.to_string(), "aborted");
    }
}
