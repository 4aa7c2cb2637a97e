//! Commit cohort for store transactions

use crate::store::StoreInner;
use std::sync::Arc;
use tracing::{debug, warn};
use treestore_concurrency::{ThreePhaseCommitCohort, TransactionId};
use treestore_core::{StoreError, StoreResult};
use treestore_listener::{resolve_changes, NotificationTask};
use treestore_storage::{DataTreeCandidate, DataTreeModification};

enum CohortState {
    Ready,
    Validated,
    Prepared {
        candidate: DataTreeCandidate,
        tasks: Vec<NotificationTask>,
        listener_generation: u64,
    },
    Committed,
    Aborted,
}

impl CohortState {
    fn name(&self) -> &'static str {
        match self {
            CohortState::Ready => "ready",
            CohortState::Validated => "validated",
            CohortState::Prepared { .. } => "prepared",
            CohortState::Committed => "committed",
            CohortState::Aborted => "aborted",
        }
    }
}

/// Drives one readied modification through validate, prepare and commit
///
/// `can_commit` and `pre_commit` run without the store lock. `commit`
/// applies the candidate and enqueues its change events inside the store's
/// critical section.
pub(crate) struct StoreCommitCohort {
    id: TransactionId,
    store: Arc<StoreInner>,
    modification: DataTreeModification,
    state: CohortState,
}

impl StoreCommitCohort {
    pub(crate) fn new(
        id: TransactionId,
        store: Arc<StoreInner>,
        modification: DataTreeModification,
    ) -> Self {
        StoreCommitCohort {
            id,
            store,
            modification,
            state: CohortState::Ready,
        }
    }

    fn out_of_order(&self, phase: &str) -> StoreError {
        StoreError::illegal_state(format!(
            "{} called on transaction {} in state {}",
            phase,
            self.id,
            self.state.name()
        ))
    }

    fn fail(&self, error: StoreError) -> StoreError {
        self.store.coordinator.record_failure(&error);
        error
    }
}

impl ThreePhaseCommitCohort for StoreCommitCohort {
    fn transaction_id(&self) -> &TransactionId {
        &self.id
    }

    fn can_commit(&mut self) -> StoreResult<()> {
        if !matches!(self.state, CohortState::Ready | CohortState::Validated) {
            return Err(self.out_of_order("can_commit"));
        }
        self.store
            .data_tree
            .validate(&self.modification)
            .map_err(|e| self.fail(e))?;

        self.state = CohortState::Validated;
        debug!(target: "treestore::txn", txn_id = %self.id, "can_commit succeeded");
        Ok(())
    }

    fn pre_commit(&mut self) -> StoreResult<()> {
        if !matches!(self.state, CohortState::Validated) {
            return Err(self.out_of_order("pre_commit"));
        }
        let candidate = self
            .store
            .data_tree
            .prepare(&self.modification)
            .map_err(|e| self.fail(e))?;
        let listeners = self.store.listeners.snapshot();
        let tasks = resolve_changes(&candidate, &listeners);

        debug!(
            target: "treestore::txn",
            txn_id = %self.id,
            events = tasks.len(),
            "pre_commit succeeded"
        );
        self.state = CohortState::Prepared {
            candidate,
            tasks,
            listener_generation: listeners.generation(),
        };
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        let (candidate, tasks, listener_generation) =
            match std::mem::replace(&mut self.state, CohortState::Ready) {
                CohortState::Prepared {
                    candidate,
                    tasks,
                    listener_generation,
                } => (candidate, tasks, listener_generation),
                other => {
                    self.state = other;
                    return Err(self.out_of_order("commit"));
                }
            };

        let version = {
            let _guard = self.store.commit_lock.lock();

            // Another commit landed since pre_commit: rebase the candidate on
            // the current tree. A failure leaves the cohort in Ready.
            let (candidate, mut stale) =
                if self.store.data_tree.version() == candidate.base_version() {
                    (candidate, false)
                } else {
                    debug!(
                        target: "treestore::txn",
                        txn_id = %self.id,
                        base_version = candidate.base_version(),
                        "Data tree moved since pre_commit, preparing again"
                    );
                    self.store
                        .data_tree
                        .validate(&self.modification)
                        .map_err(|e| self.fail(e))?;
                    let candidate = self
                        .store
                        .data_tree
                        .prepare(&self.modification)
                        .map_err(|e| self.fail(e))?;
                    (candidate, true)
                };
            let version = self
                .store
                .data_tree
                .commit(&candidate)
                .map_err(|e| self.fail(e))?;

            let listeners = self.store.listeners.snapshot();
            stale |= listeners.generation() != listener_generation;
            let tasks = if stale {
                resolve_changes(&candidate, &listeners)
            } else {
                tasks
            };
            if let Err(e) = self.store.notifications.submit_all(tasks) {
                warn!(
                    target: "treestore::txn",
                    txn_id = %self.id,
                    error = %e,
                    "Change events dropped"
                );
            }
            version
        };

        self.state = CohortState::Committed;
        self.store.coordinator.record_commit();
        debug!(target: "treestore::txn", txn_id = %self.id, version, "commit succeeded");
        Ok(())
    }

    fn abort(&mut self) {
        match self.state {
            CohortState::Committed | CohortState::Aborted => {}
            _ => {
                self.state = CohortState::Aborted;
                self.store.coordinator.record_abort();
                debug!(target: "treestore::txn", txn_id = %self.id, "Transaction aborted");
            }
        }
    }
}
