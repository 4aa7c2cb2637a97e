//! Transaction chains
//!
//! A chain hands out transactions whose base snapshot is the post-write view
//! of the last transaction readied on the chain, rather than the committed
//! tree. Writers can pipeline dependent transactions without waiting for
//! each real commit; the real commit may still fail with a conflict if a
//! transaction outside the chain changed an overlapping path first.
//!
//! Readied transactions commit in the order they were readied. A successor
//! may run its early phases while its predecessor's commit is pending; if a
//! predecessor fails, every transaction built on its view fails with
//! Conflict and the next allocation starts from the committed tree.
//!
//! At most one transaction per chain may be open at a time.

use crate::cohort::ThreePhaseCommitCohort;
use crate::transaction::{
    ReadTransaction, ReadWriteTransaction, TransactionId, TransactionReadyHandler,
    WriteTransaction,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use treestore_core::{StoreError, StoreResult, TreePath};
use treestore_storage::{DataTreeModification, DataTreeSnapshot};

/// What a chain needs from the store
pub trait TransactionBackend: TransactionReadyHandler {
    /// Allocate a new transaction identifier
    fn next_transaction_id(&self) -> TransactionId;

    /// Snapshot of the committed tree
    fn snapshot(&self) -> DataTreeSnapshot;
}

/// Outcome of one readied chain transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    Pending,
    Committed,
    Failed,
}

#[derive(Debug)]
struct LinkState {
    outcome: LinkOutcome,
    /// Dropped once this link settles so settled links do not pin the chain
    predecessor: Option<Arc<ChainLink>>,
}

/// A readied chain transaction as seen by its successor
#[derive(Debug)]
struct ChainLink {
    id: TransactionId,
    state: Mutex<LinkState>,
}

impl ChainLink {
    fn new(id: TransactionId, predecessor: Option<Arc<ChainLink>>) -> Self {
        ChainLink {
            id,
            state: Mutex::new(LinkState {
                outcome: LinkOutcome::Pending,
                predecessor,
            }),
        }
    }

    /// Own outcome, or Failed if anything it was built on failed
    fn outcome(&self) -> LinkOutcome {
        let predecessor = {
            let state = self.state.lock();
            match state.outcome {
                LinkOutcome::Pending => state.predecessor.clone(),
                settled => return settled,
            }
        };
        match predecessor.map(|p| p.outcome()) {
            Some(LinkOutcome::Failed) => LinkOutcome::Failed,
            _ => LinkOutcome::Pending,
        }
    }

    fn settle(&self, outcome: LinkOutcome) {
        let mut state = self.state.lock();
        if state.outcome == LinkOutcome::Pending {
            state.outcome = outcome;
            state.predecessor = None;
        }
    }
}

#[derive(Debug, Default)]
struct ChainState {
    /// Allocated and neither readied nor closed
    open: Option<TransactionId>,
    /// Last readied transaction whose real commit has not completed
    outstanding: Option<(Arc<ChainLink>, DataTreeSnapshot)>,
    closed: bool,
}

struct ChainInner {
    backend: Arc<dyn TransactionBackend>,
    state: Arc<Mutex<ChainState>>,
}

impl TransactionReadyHandler for ChainInner {
    fn transaction_ready(
        &self,
        id: TransactionId,
        modification: DataTreeModification,
    ) -> Box<dyn ThreePhaseCommitCohort> {
        let (link, predecessor) = {
            let mut state = self.state.lock();
            if state.open.as_ref() == Some(&id) {
                state.open = None;
            }
            let predecessor = state.outstanding.take().map(|(link, _)| link);
            let link = Arc::new(ChainLink::new(id.clone(), predecessor.clone()));
            state.outstanding = Some((Arc::clone(&link), modification.snapshot()));
            (link, predecessor)
        };
        debug!(
            target: "treestore::txn",
            txn_id = %id,
            predecessor = predecessor.as_ref().map(|p| p.id.as_str()),
            "Chained transaction ready"
        );

        let delegate = self.backend.transaction_ready(id, modification);
        Box::new(ChainedCohort {
            delegate,
            chain: Arc::clone(&self.state),
            link,
            predecessor,
            phase: ChainedPhase::Ready,
            deferred: false,
        })
    }

    fn transaction_closed(&self, id: &TransactionId) {
        let mut state = self.state.lock();
        if state.open.as_ref() == Some(id) {
            state.open = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainedPhase {
    Ready,
    Validated,
    Prepared,
    Done,
}

/// Cohort wrapper that orders a chained transaction after its predecessor
///
/// While the predecessor's real commit is pending, `can_commit` and
/// `pre_commit` are recorded but deferred: the transaction is built on the
/// predecessor's view, which the committed tree does not contain yet. Both
/// run against the real tree inside `commit` once the predecessor has
/// landed. If the predecessor fails or aborts, every phase fails with
/// Conflict.
struct ChainedCohort {
    delegate: Box<dyn ThreePhaseCommitCohort>,
    chain: Arc<Mutex<ChainState>>,
    link: Arc<ChainLink>,
    predecessor: Option<Arc<ChainLink>>,
    phase: ChainedPhase,
    deferred: bool,
}

impl ChainedCohort {
    fn predecessor_outcome(&self) -> LinkOutcome {
        self.predecessor
            .as_ref()
            .map_or(LinkOutcome::Committed, |p| p.outcome())
    }

    fn predecessor_id(&self) -> &str {
        self.predecessor.as_ref().map_or("none", |p| p.id.as_str())
    }

    fn predecessor_failed(&self) -> StoreError {
        StoreError::conflict(
            TreePath::root(),
            format!(
                "previous chained transaction {} did not commit",
                self.predecessor_id()
            ),
        )
    }

    fn out_of_order(&self, phase: &str) -> StoreError {
        StoreError::illegal_state(format!(
            "{} called on chained transaction {} in phase {:?}",
            phase,
            self.link.id,
            self.phase
        ))
    }

    /// Settle this link and stop shaping the chain's next allocation
    fn settle(&mut self, outcome: LinkOutcome) {
        self.phase = ChainedPhase::Done;
        self.link.settle(outcome);
        let mut state = self.chain.lock();
        let is_outstanding = matches!(
            &state.outstanding,
            Some((link, _)) if Arc::ptr_eq(link, &self.link)
        );
        if is_outstanding {
            state.outstanding = None;
        }
    }

    /// Run the deferred phases against the committed tree
    fn catch_up(&mut self, through: ChainedPhase) -> StoreResult<()> {
        if !self.deferred {
            return Ok(());
        }
        self.delegate.can_commit()?;
        if through == ChainedPhase::Prepared {
            self.delegate.pre_commit()?;
            self.deferred = false;
        }
        Ok(())
    }

    fn commit_after_predecessor(&mut self) -> StoreResult<()> {
        self.catch_up(ChainedPhase::Prepared)?;
        self.delegate.commit()
    }
}

impl ThreePhaseCommitCohort for ChainedCohort {
    fn transaction_id(&self) -> &TransactionId {
        self.delegate.transaction_id()
    }

    fn can_commit(&mut self) -> StoreResult<()> {
        if !matches!(self.phase, ChainedPhase::Ready | ChainedPhase::Validated) {
            return Err(self.out_of_order("can_commit"));
        }
        match self.predecessor_outcome() {
            LinkOutcome::Failed => return Err(self.predecessor_failed()),
            LinkOutcome::Pending => {
                debug!(
                    target: "treestore::txn",
                    txn_id = %self.link.id,
                    "Predecessor pending, deferring validation"
                );
                self.deferred = true;
            }
            LinkOutcome::Committed => {
                self.delegate.can_commit()?;
                self.deferred = false;
            }
        }
        self.phase = ChainedPhase::Validated;
        Ok(())
    }

    fn pre_commit(&mut self) -> StoreResult<()> {
        if self.phase != ChainedPhase::Validated {
            return Err(self.out_of_order("pre_commit"));
        }
        match self.predecessor_outcome() {
            LinkOutcome::Failed => return Err(self.predecessor_failed()),
            LinkOutcome::Pending => {}
            LinkOutcome::Committed => {
                self.catch_up(ChainedPhase::Validated)?;
                self.delegate.pre_commit()?;
                self.deferred = false;
            }
        }
        self.phase = ChainedPhase::Prepared;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if self.phase != ChainedPhase::Prepared {
            return Err(self.out_of_order("commit"));
        }
        match self.predecessor_outcome() {
            // the predecessor may still land; commit can be retried
            LinkOutcome::Pending => {
                return Err(StoreError::illegal_state(format!(
                    "chained transaction {} cannot commit before {}",
                    self.link.id,
                    self.predecessor_id()
                )))
            }
            LinkOutcome::Failed => {
                let error = self.predecessor_failed();
                self.abort();
                return Err(error);
            }
            LinkOutcome::Committed => {}
        }

        match self.commit_after_predecessor() {
            Ok(()) => {
                self.settle(LinkOutcome::Committed);
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn abort(&mut self) {
        self.delegate.abort();
        if self.phase != ChainedPhase::Done {
            self.settle(LinkOutcome::Failed);
        }
    }
}

impl Drop for ChainedCohort {
    fn drop(&mut self) {
        // an abandoned cohort never commits; successors must not wait on it
        if self.phase != ChainedPhase::Done {
            self.settle(LinkOutcome::Failed);
        }
    }
}

/// Ordered sequence of transactions with linked snapshots
///
/// # Example
///
/// ```ignore
/// let chain = store.create_transaction_chain();
///
/// let mut t1 = chain.new_write_only_transaction()?;
/// t1.write(&path, DataNode::leaf(1))?;
/// let c1 = t1.ready()?;
///
/// // Sees /a = 1 although t1 has not committed yet
/// let mut t2 = chain.new_read_write_transaction()?;
/// t2.merge(&path, DataNode::leaf(2))?;
/// let c2 = t2.ready()?;
///
/// commit_cohort(c1)?;
/// commit_cohort(c2)?;
/// ```
pub struct TransactionChain {
    inner: Arc<ChainInner>,
}

impl TransactionChain {
    /// Create a chain over `backend`
    pub fn new(backend: Arc<dyn TransactionBackend>) -> Self {
        TransactionChain {
            inner: Arc::new(ChainInner {
                backend,
                state: Arc::new(Mutex::new(ChainState::default())),
            }),
        }
    }

    fn allocate(&self) -> StoreResult<(TransactionId, DataTreeSnapshot)> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(StoreError::illegal_state("transaction chain is closed"));
        }
        if let Some(open) = &state.open {
            return Err(StoreError::illegal_state(format!(
                "previous transaction {} is still open",
                open
            )));
        }

        let failed = matches!(
            &state.outstanding,
            Some((link, _)) if link.outcome() == LinkOutcome::Failed
        );
        if failed {
            state.outstanding = None;
        }

        let id = self.inner.backend.next_transaction_id();
        let snapshot = match &state.outstanding {
            Some((_, snapshot)) => snapshot.clone(),
            None => self.inner.backend.snapshot(),
        };
        state.open = Some(id.clone());
        debug!(
            target: "treestore::txn",
            txn_id = %id,
            chained = state.outstanding.is_some(),
            "Chained transaction allocated"
        );
        Ok((id, snapshot))
    }

    fn handler(&self) -> Arc<dyn TransactionReadyHandler> {
        Arc::clone(&self.inner) as Arc<dyn TransactionReadyHandler>
    }

    /// New read-only transaction
    ///
    /// # Errors
    ///
    /// IllegalState if the chain is closed or a previous transaction is open.
    pub fn new_read_only_transaction(&self) -> StoreResult<ReadTransaction> {
        let (id, snapshot) = self.allocate()?;
        Ok(ReadTransaction::new(id, snapshot, Some(self.handler())))
    }

    /// New read-write transaction
    pub fn new_read_write_transaction(&self) -> StoreResult<ReadWriteTransaction> {
        let (id, snapshot) = self.allocate()?;
        Ok(ReadWriteTransaction::new(id, &snapshot, self.handler()))
    }

    /// New write-only transaction
    pub fn new_write_only_transaction(&self) -> StoreResult<WriteTransaction> {
        let (id, snapshot) = self.allocate()?;
        Ok(WriteTransaction::new(id, &snapshot, self.handler()))
    }

    /// Close the chain; further allocation fails. Idempotent.
    ///
    /// Transactions already readied may still be committed.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.closed = true;
            debug!(target: "treestore::txn", "Transaction chain closed");
        }
    }

    /// Whether the chain has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}
