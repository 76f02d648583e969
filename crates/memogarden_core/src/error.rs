//! Error types for MemoGarden core.

use crate::model::{EntityUuid, FactUuid};
use crate::status::SystemStatus;
use crate::types::{ContentHash, LockToken, TransactionId, Version};
use memogarden_storage::{StorageError, StoreKind};
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in MemoGarden core operations.
///
/// Consistency findings are never raised through this type; they are
/// returned as data by the consistency checker.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store operation failed.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The bounded wait for exclusive access to a store expired.
    #[error("timed out after {waited:?} acquiring the {store} store")]
    AcquisitionTimeout {
        /// Store that could not be acquired.
        store: StoreKind,
        /// How long the caller waited.
        waited: Duration,
    },

    /// An edit was based on a stale hash or version.
    #[error("entity {uuid} was modified concurrently (edit based on {based_on}, now at {current_version})")]
    OptimisticLockConflict {
        /// The entity being edited.
        uuid: EntityUuid,
        /// What the edit claimed to be based on.
        based_on: LockToken,
        /// The entity's hash at the time of the edit.
        current_hash: ContentHash,
        /// The entity's version at the time of the edit.
        current_version: Version,
    },

    /// Cross-store writes are not permitted in the current operating mode.
    #[error("cross-store writes are not permitted while the system is {status}")]
    ModeViolation {
        /// The operating mode that refused the write.
        status: SystemStatus,
    },

    /// The fact store committed but the entity store did not.
    ///
    /// The system has been marked inconsistent and needs operator attention.
    #[error("{txn} partially committed: {} fact(s) persisted without their entity writes", .orphaned_facts.len())]
    PartialCommitFailure {
        /// The failed transaction.
        txn: TransactionId,
        /// Facts that were committed and now lack entity writes.
        orphaned_facts: Vec<FactUuid>,
        /// The entity store failure.
        reason: String,
    },

    /// Entity not found.
    #[error("entity not found: {uuid}")]
    EntityNotFound {
        /// The entity UUID that was not found.
        uuid: EntityUuid,
    },

    /// Fact not found.
    #[error("fact not found: {uuid}")]
    FactNotFound {
        /// The fact UUID that was not found.
        uuid: FactUuid,
    },

    /// Caller-supplied data was rejected.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Transaction was aborted before anything became visible.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AcquisitionTimeout { store, waited } => {
                Self::AcquisitionTimeout { store, waited }
            }
            other => Self::Storage(other),
        }
    }
}

impl From<memogarden_storage::rusqlite::Error> for CoreError {
    fn from(err: memogarden_storage::rusqlite::Error) -> Self {
        Self::from(StorageError::from(err))
    }
}

impl CoreError {
    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Classifies the error for the API layer.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Storage(e) if e.is_busy() => ErrorCode::AcquisitionTimeout,
            Self::Storage(_) => ErrorCode::Storage,
            Self::Json(_) => ErrorCode::Serialization,
            Self::AcquisitionTimeout { .. } => ErrorCode::AcquisitionTimeout,
            Self::OptimisticLockConflict { .. } => ErrorCode::OptimisticLockConflict,
            Self::ModeViolation { .. } => ErrorCode::ModeViolation,
            Self::PartialCommitFailure { .. } => ErrorCode::PartialCommitFailure,
            Self::EntityNotFound { .. } | Self::FactNotFound { .. } => ErrorCode::NotFound,
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
            Self::InvalidOperation { .. } => ErrorCode::InvalidOperation,
            Self::TransactionAborted { .. } => ErrorCode::TransactionAborted,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
        }
    }

    /// Returns true if the caller may retry the same operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// Stable classification of [`CoreError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Store failure.
    Storage,
    /// Payload encoding failure.
    Serialization,
    /// Exclusive acquisition timed out.
    AcquisitionTimeout,
    /// Stale `based_on_hash` / `based_on_version`.
    OptimisticLockConflict,
    /// Write refused by the operating mode.
    ModeViolation,
    /// Fact store committed, entity store did not.
    PartialCommitFailure,
    /// Entity or fact missing.
    NotFound,
    /// Rejected input.
    InvalidInput,
    /// Operation not valid for the target's state.
    InvalidOperation,
    /// Aborted with nothing persisted.
    TransactionAborted,
    /// Bad configuration.
    InvalidConfig,
}

impl ErrorCode {
    /// Returns the snake_case name used in API error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Serialization => "serialization",
            Self::AcquisitionTimeout => "acquisition_timeout",
            Self::OptimisticLockConflict => "optimistic_lock_conflict",
            Self::ModeViolation => "mode_violation",
            Self::PartialCommitFailure => "partial_commit_failure",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::InvalidOperation => "invalid_operation",
            Self::TransactionAborted => "transaction_aborted",
            Self::InvalidConfig => "invalid_config",
        }
    }

    /// Returns the HTTP status the API layer should answer with.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::ModeViolation => 403,
            Self::NotFound => 404,
            Self::AcquisitionTimeout => 408,
            Self::OptimisticLockConflict => 409,
            Self::InvalidOperation => 422,
            Self::Storage
            | Self::Serialization
            | Self::PartialCommitFailure
            | Self::TransactionAborted
            | Self::InvalidConfig => 500,
        }
    }

    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::AcquisitionTimeout | Self::TransactionAborted)
    }

    /// Returns true if the failure leaves state an operator must inspect.
    #[must_use]
    pub fn requires_operator_attention(self) -> bool {
        matches!(self, Self::PartialCommitFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HASH_LEN;

    #[test]
    fn storage_timeout_maps_to_core_timeout() {
        let err: CoreError = StorageError::AcquisitionTimeout {
            store: StoreKind::Core,
            waited: Duration::from_millis(5),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::AcquisitionTimeout {
                store: StoreKind::Core,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(err.code().http_status(), 408);
    }

    #[test]
    fn conflict_is_client_error() {
        let err = CoreError::OptimisticLockConflict {
            uuid: EntityUuid::new(),
            based_on: LockToken::Version(Version::new(1)),
            current_hash: ContentHash::from_bytes([0; HASH_LEN]),
            current_version: Version::new(2),
        };
        assert_eq!(err.code(), ErrorCode::OptimisticLockConflict);
        assert_eq!(err.code().http_status(), 409);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("based on version 1"));
    }

    #[test]
    fn partial_commit_needs_operator_and_hides_uuids() {
        let fact = FactUuid::new();
        let err = CoreError::PartialCommitFailure {
            txn: TransactionId::new(9),
            orphaned_facts: vec![fact],
            reason: "disk full".into(),
        };
        assert!(err.code().requires_operator_attention());
        assert_eq!(err.code().http_status(), 500);
        let message = err.to_string();
        assert!(message.contains("txn:9"));
        assert!(message.contains("1 fact(s)"));
        assert!(!message.contains(&fact.to_string()));
    }

    #[test]
    fn mode_violation_names_status() {
        let err = CoreError::ModeViolation {
            status: SystemStatus::ReadOnly,
        };
        assert_eq!(err.code().as_str(), "mode_violation");
        assert!(err.to_string().contains("READ_ONLY"));
    }
}
