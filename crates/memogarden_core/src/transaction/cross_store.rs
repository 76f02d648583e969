//! Cross-store transaction.

use crate::error::{CoreError, CoreResult};
use crate::model::{Entity, EntityUuid, EntityVersion, Fact, FactUuid, NewEntity, NewFact};
use crate::repo::{EntityRepo, FactRepo};
use crate::status::StatusCell;
use crate::transaction::state::{CommitReceipt, CrossStoreState};
use crate::types::{LockToken, Timestamp, TransactionId};
use memogarden_storage::rusqlite::Connection;
use memogarden_storage::{ExclusiveTxn, Store};
use serde_json::Value;

const PARTIAL_COMMIT_TARGET: &str = "memogarden::partial_commit";

/// A unit of work spanning the Soil and Core stores.
///
/// Both stores are held exclusively from open until the transaction ends.
/// [`commit`](Self::commit) commits Soil first, then Core:
///
/// - Soil commit fails: Core is rolled back and nothing is visible.
/// - Core commit fails after Soil committed: the committed facts stay (they
///   are immutable), the system is flagged INCONSISTENT and
///   [`CoreError::PartialCommitFailure`] is returned.
///
/// Dropping the handle before commit rolls both stores back.
///
/// Facts are tallied from the Soil store itself just before its commit, so
/// receipts and partial-commit errors also list facts written through the
/// raw [`soil`](Self::soil) connection.
pub struct CrossStoreTransaction<'a> {
    id: TransactionId,
    soil: ExclusiveTxn<'a>,
    core: ExclusiveTxn<'a>,
    status: &'a StatusCell,
    state: CrossStoreState,
    soil_mark: i64,
    facts: Vec<FactUuid>,
    entities: Vec<EntityUuid>,
}

impl<'a> CrossStoreTransaction<'a> {
    /// Begins exclusive transactions on Soil, then Core.
    ///
    /// If Core cannot be acquired the Soil transaction is rolled back.
    pub(crate) fn begin(
        id: TransactionId,
        soil: &'a Store,
        core: &'a Store,
        status: &'a StatusCell,
    ) -> CoreResult<Self> {
        let soil = soil.begin_exclusive()?;
        let soil_mark = FactRepo::new(soil.connection()?).high_water_mark()?;
        let core = core.begin_exclusive()?;
        tracing::debug!(txn = %id, "cross-store transaction opened");
        Ok(Self {
            id,
            soil,
            core,
            status,
            state: CrossStoreState::Open,
            soil_mark,
            facts: Vec::new(),
            entities: Vec::new(),
        })
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CrossStoreState {
        self.state
    }

    /// Returns the Soil connection for raw statements.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] once the transaction has ended.
    pub fn soil(&self) -> CoreResult<&Connection> {
        self.ensure_open()?;
        Ok(self.soil.connection()?)
    }

    /// Returns the Core connection for raw statements.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] once the transaction has ended.
    pub fn core(&self) -> CoreResult<&Connection> {
        self.ensure_open()?;
        Ok(self.core.connection()?)
    }

    /// Creates an entity at version 1.
    ///
    /// # Errors
    ///
    /// See [`EntityRepo::insert`].
    pub fn insert_entity(&mut self, new: NewEntity) -> CoreResult<Entity> {
        let entity = EntityRepo::new(self.core()?).insert(new, Timestamp::now())?;
        self.entities.push(entity.uuid);
        Ok(entity)
    }

    /// Writes a new version of an entity, checked against `based_on`.
    ///
    /// # Errors
    ///
    /// See [`EntityRepo::update`].
    pub fn update_entity(
        &mut self,
        uuid: EntityUuid,
        data: Value,
        based_on: &LockToken,
    ) -> CoreResult<Entity> {
        let entity =
            EntityRepo::new(self.core()?).update(uuid, data, based_on, Timestamp::now())?;
        self.entities.push(uuid);
        Ok(entity)
    }

    /// Soft-deletes an entity.
    ///
    /// # Errors
    ///
    /// See [`EntityRepo::forget`].
    pub fn forget_entity(
        &mut self,
        uuid: EntityUuid,
        based_on: &LockToken,
    ) -> CoreResult<Entity> {
        let entity = EntityRepo::new(self.core()?).forget(uuid, based_on, Timestamp::now())?;
        self.entities.push(uuid);
        Ok(entity)
    }

    /// Marks `uuid` as replaced by `by`.
    ///
    /// # Errors
    ///
    /// See [`EntityRepo::supersede`].
    pub fn supersede_entity(
        &mut self,
        uuid: EntityUuid,
        by: EntityUuid,
        based_on: &LockToken,
    ) -> CoreResult<Entity> {
        let entity =
            EntityRepo::new(self.core()?).supersede(uuid, by, based_on, Timestamp::now())?;
        self.entities.push(uuid);
        Ok(entity)
    }

    /// Reads an entity, including this transaction's uncommitted writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_entity(&self, uuid: EntityUuid) -> CoreResult<Option<Entity>> {
        EntityRepo::new(self.core()?).get(uuid)
    }

    /// Reads an entity's version history.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn entity_history(&self, uuid: EntityUuid) -> CoreResult<Vec<EntityVersion>> {
        EntityRepo::new(self.core()?).history(uuid)
    }

    /// Appends a fact.
    ///
    /// # Errors
    ///
    /// See [`FactRepo::insert`].
    pub fn insert_fact(&mut self, new: NewFact) -> CoreResult<Fact> {
        let fact = FactRepo::new(self.soil()?).insert(new, Timestamp::now())?;
        self.facts.push(fact.uuid);
        Ok(fact)
    }

    /// Reads a fact, including this transaction's uncommitted writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get_fact(&self, uuid: FactUuid) -> CoreResult<Option<Fact>> {
        FactRepo::new(self.soil()?).get(uuid)
    }

    /// Commits Soil, then Core.
    ///
    /// Calling `commit` on an ended transaction does nothing and returns a
    /// receipt carrying the final state.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionAborted`] if the Soil commit fails,
    /// or [`CoreError::PartialCommitFailure`] if only Soil committed.
    pub fn commit(&mut self) -> CoreResult<CommitReceipt> {
        if self.state != CrossStoreState::Open {
            tracing::debug!(txn = %self.id, state = %self.state, "commit on ended transaction ignored");
            return Ok(self.receipt());
        }
        match FactRepo::new(self.soil.connection()?).appended_since(self.soil_mark) {
            Ok(facts) => self.facts = facts,
            Err(e) => {
                tracing::warn!(txn = %self.id, error = %e, "could not tally soil writes; using recorded facts");
            }
        }
        self.state = CrossStoreState::Committing;

        if let Err(e) = self.soil.commit() {
            self.state = CrossStoreState::Aborted;
            if let Err(rollback_err) = self.core.rollback() {
                tracing::warn!(txn = %self.id, error = %rollback_err, "core rollback after soil commit failure failed");
            }
            tracing::warn!(txn = %self.id, error = %e, "soil commit failed; nothing persisted");
            return Err(CoreError::transaction_aborted(format!(
                "{}: soil commit failed: {e}",
                self.id
            )));
        }

        if let Err(e) = self.core.commit() {
            self.state = CrossStoreState::Aborted;
            // Both no-ops: Soil is committed, Core already rolled back.
            let _ = self.core.rollback();
            let _ = self.soil.rollback();
            return Err(self.partial_failure(&e.to_string()));
        }

        self.state = CrossStoreState::Committed;
        tracing::debug!(
            txn = %self.id,
            facts = self.facts.len(),
            entities = self.entities.len(),
            "cross-store transaction committed"
        );
        Ok(self.receipt())
    }

    /// Rolls both stores back.
    ///
    /// Both rollbacks are attempted even if the first fails. Calling
    /// `rollback` on an ended transaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first rollback failure.
    pub fn rollback(&mut self) -> CoreResult<()> {
        if self.state.is_terminal() {
            tracing::debug!(txn = %self.id, state = %self.state, "rollback on ended transaction ignored");
            return Ok(());
        }
        self.state = CrossStoreState::Aborted;
        let soil = self.soil.rollback();
        let core = self.core.rollback();
        tracing::debug!(txn = %self.id, "cross-store transaction rolled back");
        soil?;
        core?;
        Ok(())
    }

    fn partial_failure(&self, reason: &str) -> CoreError {
        tracing::error!(
            target: PARTIAL_COMMIT_TARGET,
            txn = %self.id,
            orphaned_facts = self.facts.len(),
            error = %reason,
            "soil committed but core did not; system marked INCONSISTENT"
        );
        self.status.mark_inconsistent(format!(
            "{} committed {} fact(s) without their entity writes: {reason}",
            self.id,
            self.facts.len()
        ));
        CoreError::PartialCommitFailure {
            txn: self.id,
            orphaned_facts: self.facts.clone(),
            reason: reason.to_string(),
        }
    }

    fn receipt(&self) -> CommitReceipt {
        CommitReceipt {
            txn: self.id,
            outcome: self.state,
            facts: self.facts.clone(),
            entities: self.entities.clone(),
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.state == CrossStoreState::Open {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "{} is {}",
                self.id, self.state
            )))
        }
    }
}

impl Drop for CrossStoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(txn = %self.id, "rolling back cross-store transaction dropped while open");
            if let Err(e) = self.rollback() {
                tracing::warn!(txn = %self.id, error = %e, "rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for CrossStoreTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossStoreTransaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("facts", &self.facts.len())
            .field("entities", &self.entities.len())
            .finish()
    }
}
