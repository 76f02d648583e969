//! Transaction coordinator.

mod ops;

pub use ops::Supersession;

use crate::checker::{ConsistencyChecker, ConsistencyReport};
use crate::config::{Config, StoreLocation};
use crate::error::{CoreError, CoreResult};
use crate::hash::verify_chain;
use crate::model::{Entity, EntityUuid, EntityVersion, Fact, FactUuid};
use crate::repo::{ensure_schema, EntityRepo, FactRepo};
use crate::status::{HealthReport, StatusCell, SystemStatus};
use crate::transaction::{CrossStoreState, CrossStoreTransaction};
use crate::types::TransactionId;
use memogarden_storage::{Store, StoreKind};
use std::sync::atomic::{AtomicU64, Ordering};

/// Single entry point for writes that touch both stores.
///
/// The coordinator owns the two stores and the system status. Every
/// cross-store write goes through [`open_cross_store_transaction`], which
/// refuses to start while the system is READ_ONLY or SAFE_MODE.
///
/// [`open_cross_store_transaction`]: Coordinator::open_cross_store_transaction
pub struct Coordinator {
    soil: Store,
    core: Store,
    status: StatusCell,
    checker: ConsistencyChecker,
    next_txid: AtomicU64,
    config: Config,
}

impl Coordinator {
    /// Opens both stores as configured and runs the startup check.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or its schema applied.
    /// A failing consistency check never fails startup; it is reported
    /// through [`Coordinator::health`].
    pub fn open(config: Config) -> CoreResult<Self> {
        let soil = open_store(StoreKind::Soil, &config.soil, &config)?;
        let core = open_store(StoreKind::Core, &config.core, &config)?;
        Self::with_stores(soil, core, config)
    }

    /// Wraps already-open stores and runs the startup check.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the stores are swapped, or an
    /// error if a schema cannot be applied.
    pub fn with_stores(soil: Store, core: Store, config: Config) -> CoreResult<Self> {
        if soil.kind() != StoreKind::Soil || core.kind() != StoreKind::Core {
            return Err(CoreError::invalid_config(format!(
                "expected soil and core stores, got {} and {}",
                soil.kind(),
                core.kind()
            )));
        }
        ensure_schema(&soil)?;
        ensure_schema(&core)?;

        let coordinator = Self {
            soil,
            core,
            status: StatusCell::default(),
            checker: ConsistencyChecker::new(config.orphan_probe_batch),
            next_txid: AtomicU64::new(1),
            config,
        };
        coordinator.startup_check();
        Ok(coordinator)
    }

    fn startup_check(&self) {
        match self.check_consistency() {
            Ok(report) => tracing::info!(
                status = %report.status,
                findings = report.findings.len(),
                facts = report.facts_scanned,
                entities = report.entities_scanned,
                "startup consistency check complete"
            ),
            Err(e) => {
                if self.status.get() != SystemStatus::SafeMode {
                    self.status.set(
                        SystemStatus::SafeMode,
                        format!("startup consistency check could not run: {e}"),
                    );
                }
                tracing::error!(error = %e, "startup consistency check failed; starting in SAFE_MODE");
            }
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the Soil store, for single-store access.
    ///
    /// Writes made here autocommit outside any cross-store transaction and
    /// never appear in a receipt.
    #[must_use]
    pub fn soil(&self) -> &Store {
        &self.soil
    }

    /// Returns the Core store, for single-store access.
    #[must_use]
    pub fn core(&self) -> &Store {
        &self.core
    }

    /// Opens a transaction over both stores.
    ///
    /// Allowed while INCONSISTENT, with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ModeViolation`] while READ_ONLY or SAFE_MODE,
    /// without touching either store, or [`CoreError::AcquisitionTimeout`]
    /// if a store stays busy.
    pub fn open_cross_store_transaction(&self) -> CoreResult<CrossStoreTransaction<'_>> {
        let status = self.status.get();
        if !status.permits_cross_store_writes() {
            tracing::debug!(%status, "cross-store transaction refused");
            return Err(CoreError::ModeViolation { status });
        }
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        if status == SystemStatus::Inconsistent {
            tracing::warn!(txn = %id, "opening cross-store transaction while INCONSISTENT");
        }
        CrossStoreTransaction::begin(id, &self.soil, &self.core, &self.status)
    }

    /// Executes a function within a cross-store transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, both stores are rolled back and the error is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the function's error, any commit error, or
    /// [`CoreError::TransactionAborted`] if the function rolled back the
    /// transaction itself but returned `Ok`.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut CrossStoreTransaction<'_>) -> CoreResult<T>,
    {
        let mut tx = self.open_cross_store_transaction()?;
        match f(&mut tx) {
            Ok(value) => {
                let receipt = tx.commit()?;
                if receipt.outcome == CrossStoreState::Committed {
                    Ok(value)
                } else {
                    Err(CoreError::transaction_aborted(format!(
                        "{} was rolled back inside its scope",
                        receipt.txn
                    )))
                }
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(txn = %tx.id(), error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Scans both stores and updates the system status.
    ///
    /// Findings only move the status between NORMAL and INCONSISTENT, or to
    /// SAFE_MODE on storage corruption; READ_ONLY and SAFE_MODE are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be scanned. Unless the failure is
    /// a retryable timeout, the system enters SAFE_MODE.
    pub fn check_consistency(&self) -> CoreResult<ConsistencyReport> {
        self.run_check(false)
    }

    /// Leaves READ_ONLY or SAFE_MODE by re-running the consistency check.
    ///
    /// The resulting status is whatever the check finds.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::check_consistency`].
    pub fn resume(&self) -> CoreResult<ConsistencyReport> {
        tracing::info!(from = %self.status.get(), "operator resume requested");
        self.run_check(true)
    }

    fn run_check(&self, override_admin: bool) -> CoreResult<ConsistencyReport> {
        let epoch = self.status.partial_commit_epoch();
        let mut report = match self.checker.run(&self.soil, &self.core) {
            Ok(report) => report,
            Err(e) => {
                if !e.is_retryable() {
                    self.status.set(
                        SystemStatus::SafeMode,
                        format!("consistency scan could not run: {e}"),
                    );
                }
                return Err(e);
            }
        };
        for finding in &report.findings {
            tracing::warn!(%finding, "consistency finding");
        }
        report.status = self
            .status
            .apply_check(report.status, report.findings.clone(), override_admin, epoch);
        Ok(report)
    }

    /// Returns the current operating mode.
    #[must_use]
    pub fn status(&self) -> SystemStatus {
        self.status.get()
    }

    /// Returns the status, its reason and the latest findings.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        self.status.health()
    }

    /// Refuses cross-store writes until [`Coordinator::resume`].
    pub fn enter_read_only(&self, reason: impl Into<String>) {
        self.status.set(SystemStatus::ReadOnly, reason);
    }

    /// Enters SAFE_MODE until [`Coordinator::resume`].
    pub fn enter_safe_mode(&self, reason: impl Into<String>) {
        self.status.set(SystemStatus::SafeMode, reason);
    }

    /// Reads an entity's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_entity(&self, uuid: EntityUuid) -> CoreResult<Option<Entity>> {
        self.core.read(|conn| EntityRepo::new(conn).get(uuid))
    }

    /// Reads a fact.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_fact(&self, uuid: FactUuid) -> CoreResult<Option<Fact>> {
        self.soil.read(|conn| FactRepo::new(conn).get(uuid))
    }

    /// Returns the facts that declare `uuid` as their owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn facts_for_entity(&self, uuid: EntityUuid) -> CoreResult<Vec<Fact>> {
        self.soil.read(|conn| FactRepo::new(conn).owned_by(uuid))
    }

    /// Returns every version of an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityNotFound`] if the entity has no history.
    pub fn entity_history(&self, uuid: EntityUuid) -> CoreResult<Vec<EntityVersion>> {
        let history = self.core.read(|conn| EntityRepo::new(conn).history(uuid))?;
        if history.is_empty() {
            return Err(CoreError::EntityNotFound { uuid });
        }
        Ok(history)
    }

    /// Verifies an entity's full hash chain from version 1.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityNotFound`] if the entity has no history.
    pub fn verify_entity_chain(&self, uuid: EntityUuid) -> CoreResult<bool> {
        let history = self.entity_history(uuid)?;
        let rooted = history
            .first()
            .is_some_and(|first| first.version.is_first() && first.previous_hash.is_none());
        Ok(rooted && verify_chain(&history))
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("soil", &self.soil.path())
            .field("core", &self.core.path())
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

fn open_store(kind: StoreKind, location: &StoreLocation, config: &Config) -> CoreResult<Store> {
    let options = config.store_options();
    let store = match location {
        StoreLocation::Memory => Store::open_in_memory(kind, options)?,
        StoreLocation::File(path) => Store::open(kind, path, options)?,
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FactKind, NewEntity, NewFact};
    use memogarden_storage::{StorageError, StorageResult, StoreOptions, TxnEvent, TxnObserver};
    use serde_json::json;
    use std::sync::Arc;

    struct VetoCommit;

    impl TxnObserver for VetoCommit {
        fn before(&self, store: StoreKind, event: TxnEvent) -> StorageResult<()> {
            if event == TxnEvent::Commit {
                Err(StorageError::Injected { store, event })
            } else {
                Ok(())
            }
        }
    }

    fn coordinator() -> Coordinator {
        Coordinator::open(Config::default()).unwrap()
    }

    #[test]
    fn starts_normal_on_empty_stores() {
        let coord = coordinator();
        assert_eq!(coord.status(), SystemStatus::Normal);
        assert!(coord.health().last_checked_at.is_some());
    }

    #[test]
    fn swapped_stores_are_rejected() {
        let soil = Store::open_in_memory(StoreKind::Soil, StoreOptions::default()).unwrap();
        let core = Store::open_in_memory(StoreKind::Core, StoreOptions::default()).unwrap();
        let err = Coordinator::with_stores(core, soil, Config::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn transaction_ids_increase() {
        let coord = coordinator();
        let first = coord.open_cross_store_transaction().unwrap().id();
        let second = coord.open_cross_store_transaction().unwrap().id();
        assert!(first < second);
    }

    #[test]
    fn closure_error_rolls_back() {
        let coord = coordinator();
        let result: CoreResult<()> = coord.transaction(|tx| {
            tx.insert_entity(NewEntity::new("Note", json!({})))?;
            tx.insert_fact(NewFact::new(FactKind::Note, json!({})))?;
            Err(CoreError::invalid_input("changed my mind"))
        });
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
        let counts = (
            coord.soil().read(|c| FactRepo::new(c).count()).unwrap(),
            coord.core().read(|c| EntityRepo::new(c).count()).unwrap(),
        );
        assert_eq!(counts, (0, 0));
    }

    #[test]
    fn closure_that_rolls_back_reports_abort() {
        let coord = coordinator();
        let result = coord.transaction(|tx| tx.rollback());
        assert!(matches!(result, Err(CoreError::TransactionAborted { .. })));
    }

    #[test]
    fn admin_modes_gate_and_resume() {
        let coord = coordinator();
        coord.enter_read_only("backup");
        assert!(matches!(
            coord.open_cross_store_transaction(),
            Err(CoreError::ModeViolation {
                status: SystemStatus::ReadOnly
            })
        ));
        assert_eq!(coord.check_consistency().unwrap().status, SystemStatus::ReadOnly);
        let report = coord.resume().unwrap();
        assert_eq!(report.status, SystemStatus::Normal);
        assert!(coord.open_cross_store_transaction().is_ok());
    }

    #[test]
    fn scan_overlapping_a_partial_commit_keeps_inconsistent() {
        let soil = Store::open_in_memory(StoreKind::Soil, StoreOptions::default()).unwrap();
        let core = Store::open_in_memory(StoreKind::Core, StoreOptions::default())
            .unwrap()
            .with_observer(Arc::new(VetoCommit));
        let coord = Coordinator::with_stores(soil, core, Config::default()).unwrap();
        assert_eq!(coord.status(), SystemStatus::Normal);

        // Scan completes before the partial commit is flagged.
        let epoch = coord.status.partial_commit_epoch();
        let stale = coord.checker.run(&coord.soil, &coord.core).unwrap();
        assert_eq!(stale.status, SystemStatus::Normal);

        let err = coord
            .create_entity(NewEntity::new("Note", json!({})))
            .unwrap_err();
        assert!(matches!(err, CoreError::PartialCommitFailure { .. }));

        let status = coord
            .status
            .apply_check(stale.status, stale.findings, false, epoch);
        assert_eq!(status, SystemStatus::Inconsistent);
        assert!(coord.health().requires_operator_attention);

        let report = coord.check_consistency().unwrap();
        assert_eq!(report.status, SystemStatus::Inconsistent);
        assert_eq!(report.orphans().count(), 1);
    }

    #[test]
    fn missing_history_is_not_found() {
        let coord = coordinator();
        assert!(matches!(
            coord.verify_entity_chain(EntityUuid::new()),
            Err(CoreError::EntityNotFound { .. })
        ));
    }
}
