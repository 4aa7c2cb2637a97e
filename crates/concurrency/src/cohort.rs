//! Three-phase commit participant
//!
//! `ready()` on a write transaction hands its sealed modification to the
//! backend and returns a cohort. The caller then drives the phases in order:
//!
//! 1. `can_commit` - validate against the current committed tree
//! 2. `pre_commit` - prepare the candidate and compute change events
//! 3. `commit` - install the candidate and publish the events
//!
//! `abort` may be called at any point before `commit` succeeds; it never
//! fails and may be called repeatedly. Every phase reports failure as a
//! returned error, so the caller decides between retry and abort.

use crate::transaction::TransactionId;
use tracing::{debug, warn};
use treestore_core::StoreResult;

/// Commit participant for one readied transaction
pub trait ThreePhaseCommitCohort: Send {
    /// Identifier of the transaction this cohort commits
    fn transaction_id(&self) -> &TransactionId;

    /// Validate the modification against current shared state
    ///
    /// # Errors
    ///
    /// - Conflict if another transaction changed an overlapping path
    /// - ValidationFailed if the data was rejected by the schema hook
    /// - IllegalState if called out of order
    fn can_commit(&mut self) -> StoreResult<()>;

    /// Prepare the candidate and resolve change events, without publishing
    fn pre_commit(&mut self) -> StoreResult<()>;

    /// Apply the prepared candidate and publish change events
    ///
    /// # Errors
    ///
    /// IllegalState if `pre_commit` has not succeeded.
    fn commit(&mut self) -> StoreResult<()>;

    /// Discard the modification; always succeeds
    fn abort(&mut self);
}

impl std::fmt::Debug for dyn ThreePhaseCommitCohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreePhaseCommitCohort")
            .field("transaction_id", self.transaction_id())
            .finish()
    }
}

/// Drive a cohort through all three phases, aborting on the first failure
///
/// # Example
///
/// ```ignore
/// let cohort = tx.ready()?;
/// commit_cohort(cohort)?;
/// ```
pub fn commit_cohort(mut cohort: Box<dyn ThreePhaseCommitCohort>) -> StoreResult<()> {
    let result = cohort
        .can_commit()
        .and_then(|_| cohort.pre_commit())
        .and_then(|_| cohort.commit());

    match result {
        Ok(()) => {
            debug!(target: "treestore::txn", txn_id = %cohort.transaction_id(), "Transaction committed");
            Ok(())
        }
        Err(e) => {
            warn!(
                target: "treestore::txn",
                txn_id = %cohort.transaction_id(),
                error = %e,
                "Transaction aborted"
            );
            cohort.abort();
            Err(e)
        }
    }
}
