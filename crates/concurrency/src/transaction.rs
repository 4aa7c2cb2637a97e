//! Transaction handles
//!
//! A transaction wraps either a snapshot (read-only) or a modification
//! (write-only and read-write) together with its identifier and lifecycle
//! state.
//!
//! # Lifecycle
//!
//! - `Open`: reads and writes allowed
//! - `Ready`: `ready()` was called; the modification now belongs to the
//!   returned cohort. Writes fail, reads still see the sealed view
//! - `Closed`: everything fails except `close()`, which is idempotent
//!
//! `Open → Ready` happens at most once. Dropping a handle closes it.

use crate::cohort::ThreePhaseCommitCohort;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use treestore_core::{DataNode, StoreError, StoreResult, TreePath};
use treestore_storage::{DataTreeModification, DataTreeSnapshot};

/// Process-unique transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Arc<str>);

impl TransactionId {
    /// Create an identifier `"{prefix}-{sequence}"`
    pub fn new(prefix: &str, sequence: u64) -> Self {
        TransactionId(Arc::from(format!("{}-{}", prefix, sequence)))
    }

    /// Identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocates identifiers with a fixed prefix
#[derive(Debug)]
pub struct TransactionIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl TransactionIdGenerator {
    /// Create a generator; the first identifier is `"{prefix}-1"`
    pub fn new(prefix: impl Into<String>) -> Self {
        TransactionIdGenerator {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Next identifier
    pub fn next_id(&self) -> TransactionId {
        TransactionId::new(&self.prefix, self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of identifiers handed out
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting reads and writes
    Open,
    /// Sealed and handed to a commit cohort
    Ready,
    /// Closed; no further operations
    Closed,
}

/// Receives sealed modifications from write transactions
///
/// Implemented by the store (plain transactions) and by transaction chains.
pub trait TransactionReadyHandler: Send + Sync {
    /// Take ownership of a sealed modification and return its commit cohort
    fn transaction_ready(
        &self,
        id: TransactionId,
        modification: DataTreeModification,
    ) -> Box<dyn ThreePhaseCommitCohort>;

    /// A transaction was closed without being readied
    fn transaction_closed(&self, _id: &TransactionId) {}
}

fn check_data_path(path: &TreePath) -> StoreResult<()> {
    if path.contains_wildcard() {
        Err(StoreError::illegal_argument(format!(
            "wildcard not allowed in data path {}",
            path
        )))
    } else {
        Ok(())
    }
}

fn closed_error(id: &TransactionId) -> StoreError {
    StoreError::illegal_state(format!("transaction {} is closed", id))
}

// ============================================================================
// Read-only
// ============================================================================

/// Read-only transaction over a fixed snapshot
pub struct ReadTransaction {
    id: TransactionId,
    snapshot: Option<DataTreeSnapshot>,
    handler: Option<Arc<dyn TransactionReadyHandler>>,
}

impl ReadTransaction {
    /// Create a read-only transaction
    ///
    /// `handler` is told when the transaction closes (used by chains).
    pub fn new(
        id: TransactionId,
        snapshot: DataTreeSnapshot,
        handler: Option<Arc<dyn TransactionReadyHandler>>,
    ) -> Self {
        ReadTransaction {
            id,
            snapshot: Some(snapshot),
            handler,
        }
    }

    /// Transaction identifier
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    /// Current state (Open or Closed)
    pub fn state(&self) -> TransactionState {
        if self.snapshot.is_some() {
            TransactionState::Open
        } else {
            TransactionState::Closed
        }
    }

    /// Read the node at `path`
    ///
    /// # Errors
    ///
    /// IllegalState after close, IllegalArgument for a wildcard path.
    pub fn read(&self, path: &TreePath) -> StoreResult<Option<Arc<DataNode>>> {
        check_data_path(path)?;
        let snapshot = self.snapshot.as_ref().ok_or_else(|| closed_error(&self.id))?;
        Ok(snapshot.read(path))
    }

    /// Whether a node exists at `path`
    pub fn exists(&self, path: &TreePath) -> StoreResult<bool> {
        Ok(self.read(path)?.is_some())
    }

    /// Close the transaction; idempotent
    pub fn close(&mut self) {
        if self.snapshot.take().is_some() {
            debug!(target: "treestore::txn", txn_id = %self.id, "Read transaction closed");
            if let Some(handler) = &self.handler {
                handler.transaction_closed(&self.id);
            }
        }
    }
}

impl Drop for ReadTransaction {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ReadTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTransaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Write-only and read-write
// ============================================================================

/// Shared core of the writable transaction flavours
struct WriteCore {
    id: TransactionId,
    state: TransactionState,
    modification: Option<DataTreeModification>,
    sealed_view: Option<DataTreeSnapshot>,
    handler: Arc<dyn TransactionReadyHandler>,
}

impl WriteCore {
    fn new(
        id: TransactionId,
        snapshot: &DataTreeSnapshot,
        handler: Arc<dyn TransactionReadyHandler>,
    ) -> Self {
        WriteCore {
            id,
            state: TransactionState::Open,
            modification: Some(snapshot.new_modification()),
            sealed_view: None,
            handler,
        }
    }

    fn ensure_open(&mut self) -> StoreResult<&mut DataTreeModification> {
        match (self.state, self.modification.as_mut()) {
            (TransactionState::Open, Some(modification)) => Ok(modification),
            (TransactionState::Ready, _) => Err(StoreError::illegal_state(format!(
                "transaction {} is no longer open",
                self.id
            ))),
            _ => Err(closed_error(&self.id)),
        }
    }

    fn write(&mut self, path: &TreePath, data: Arc<DataNode>) -> StoreResult<()> {
        self.ensure_open()?.write(path, data)
    }

    fn merge(&mut self, path: &TreePath, data: Arc<DataNode>) -> StoreResult<()> {
        self.ensure_open()?.merge(path, data)
    }

    fn delete(&mut self, path: &TreePath) -> StoreResult<()> {
        self.ensure_open()?.delete(path)
    }

    fn read(&self, path: &TreePath) -> StoreResult<Option<Arc<DataNode>>> {
        check_data_path(path)?;
        match (self.state, &self.modification, &self.sealed_view) {
            (TransactionState::Open, Some(modification), _) => Ok(modification.read(path)),
            (TransactionState::Ready, _, Some(view)) => Ok(view.read(path)),
            _ => Err(closed_error(&self.id)),
        }
    }

    fn ready(&mut self) -> StoreResult<Box<dyn ThreePhaseCommitCohort>> {
        let mut modification = match (self.state, self.modification.take()) {
            (TransactionState::Open, Some(modification)) => modification,
            (TransactionState::Closed, _) => return Err(closed_error(&self.id)),
            (_, modification) => {
                self.modification = modification;
                return Err(StoreError::illegal_state(format!(
                    "transaction {} is no longer open",
                    self.id
                )));
            }
        };

        modification.ready();
        self.sealed_view = Some(modification.snapshot());
        self.state = TransactionState::Ready;
        debug!(target: "treestore::txn", txn_id = %self.id, "Transaction ready");
        Ok(self
            .handler
            .transaction_ready(self.id.clone(), modification))
    }

    fn close(&mut self) {
        match self.state {
            TransactionState::Closed => {}
            TransactionState::Open => {
                self.state = TransactionState::Closed;
                self.modification = None;
                debug!(target: "treestore::txn", txn_id = %self.id, "Transaction closed before ready");
                self.handler.transaction_closed(&self.id);
            }
            TransactionState::Ready => {
                self.state = TransactionState::Closed;
                self.sealed_view = None;
            }
        }
    }
}

impl Drop for WriteCore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Write-only transaction
///
/// # Example
///
/// ```ignore
/// let mut tx = store.new_write_only_transaction();
/// tx.write(&"/a".parse()?, DataNode::leaf(1))?;
/// let cohort = tx.ready()?;
/// commit_cohort(cohort)?;
/// ```
pub struct WriteTransaction {
    core: WriteCore,
}

impl WriteTransaction {
    /// Create a write-only transaction based on `snapshot`
    pub fn new(
        id: TransactionId,
        snapshot: &DataTreeSnapshot,
        handler: Arc<dyn TransactionReadyHandler>,
    ) -> Self {
        WriteTransaction {
            core: WriteCore::new(id, snapshot, handler),
        }
    }

    /// Transaction identifier
    pub fn id(&self) -> &TransactionId {
        &self.core.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.core.state
    }

    /// Replace the subtree at `path`
    ///
    /// # Errors
    ///
    /// - IllegalState unless the transaction is open
    /// - IllegalArgument for malformed paths or a missing parent
    pub fn write(&mut self, path: &TreePath, data: impl Into<Arc<DataNode>>) -> StoreResult<()> {
        self.core.write(path, data.into())
    }

    /// Merge into the subtree at `path`
    pub fn merge(&mut self, path: &TreePath, data: impl Into<Arc<DataNode>>) -> StoreResult<()> {
        self.core.merge(path, data.into())
    }

    /// Remove the subtree at `path`
    pub fn delete(&mut self, path: &TreePath) -> StoreResult<()> {
        self.core.delete(path)
    }

    /// Seal the transaction and obtain its commit cohort
    ///
    /// # Errors
    ///
    /// IllegalState if already readied or closed.
    pub fn ready(&mut self) -> StoreResult<Box<dyn ThreePhaseCommitCohort>> {
        self.core.ready()
    }

    /// Close the transaction; idempotent
    pub fn close(&mut self) {
        self.core.close()
    }
}

impl fmt::Debug for WriteTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("id", &self.core.id)
            .field("state", &self.core.state)
            .finish()
    }
}

/// Read-write transaction; reads see the transaction's own writes
pub struct ReadWriteTransaction {
    core: WriteCore,
}

impl ReadWriteTransaction {
    /// Create a read-write transaction based on `snapshot`
    pub fn new(
        id: TransactionId,
        snapshot: &DataTreeSnapshot,
        handler: Arc<dyn TransactionReadyHandler>,
    ) -> Self {
        ReadWriteTransaction {
            core: WriteCore::new(id, snapshot, handler),
        }
    }

    /// Transaction identifier
    pub fn id(&self) -> &TransactionId {
        &self.core.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.core.state
    }

    /// Read through the transaction's modification
    ///
    /// # Errors
    ///
    /// IllegalState after close, IllegalArgument for a wildcard path.
    pub fn read(&self, path: &TreePath) -> StoreResult<Option<Arc<DataNode>>> {
        self.core.read(path)
    }

    /// Whether a node exists at `path`
    pub fn exists(&self, path: &TreePath) -> StoreResult<bool> {
        Ok(self.core.read(path)?.is_some())
    }

    /// Replace the subtree at `path`
    pub fn write(&mut self, path: &TreePath, data: impl Into<Arc<DataNode>>) -> StoreResult<()> {
        self.core.write(path, data.into())
    }

    /// Merge into the subtree at `path`
    pub fn merge(&mut self, path: &TreePath, data: impl Into<Arc<DataNode>>) -> StoreResult<()> {
        self.core.merge(path, data.into())
    }

    /// Remove the subtree at `path`
    pub fn delete(&mut self, path: &TreePath) -> StoreResult<()> {
        self.core.delete(path)
    }

    /// Seal the transaction and obtain its commit cohort
    pub fn ready(&mut self) -> StoreResult<Box<dyn ThreePhaseCommitCohort>> {
        self.core.ready()
    }

    /// Close the transaction; idempotent
    pub fn close(&mut self) {
        self.core.close()
    }
}

impl fmt::Debug for ReadWriteTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteTransaction")
            .field("id", &self.core.id)
            .field("state", &self.core.state)
            .finish()
    }
}
