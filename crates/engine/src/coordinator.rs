//! Transaction identifiers and metrics
//!
//! The coordinator allocates `"{store-name}-{counter}"` identifiers and keeps
//! lifecycle counters. The counters use Relaxed ordering: they are purely
//! observational and synchronize nothing else.

use std::sync::atomic::{AtomicU64, Ordering};
use treestore_concurrency::{TransactionId, TransactionIdGenerator};
use treestore_core::StoreError;

/// Identifier allocation and commit/abort accounting for one store
#[derive(Debug)]
pub struct TransactionCoordinator {
    ids: TransactionIdGenerator,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_conflicts: AtomicU64,
    total_validation_failures: AtomicU64,
}

impl TransactionCoordinator {
    /// Coordinator whose identifiers start with `store_name`
    pub fn new(store_name: &str) -> Self {
        Self {
            ids: TransactionIdGenerator::new(store_name),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            total_conflicts: AtomicU64::new(0),
            total_validation_failures: AtomicU64::new(0),
        }
    }

    /// Allocate the next transaction identifier
    pub fn next_txn_id(&self) -> TransactionId {
        self.ids.next_id()
    }

    /// Record a successful commit
    pub fn record_commit(&self) {
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abort
    pub fn record_abort(&self) {
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed commit phase
    pub fn record_failure(&self, error: &StoreError) {
        if error.is_conflict() {
            self.total_conflicts.fetch_add(1, Ordering::Relaxed);
        } else if error.is_validation_failed() {
            self.total_validation_failures
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current counters; `active_registrations` is supplied by the store
    pub fn metrics(&self, active_registrations: usize) -> TransactionMetrics {
        TransactionMetrics {
            total_allocated: self.ids.allocated(),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_conflicts: self.total_conflicts.load(Ordering::Relaxed),
            total_validation_failures: self.total_validation_failures.load(Ordering::Relaxed),
            active_registrations,
        }
    }
}

/// Transaction metrics
///
/// Provides statistics about transaction lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMetrics {
    /// Transaction identifiers handed out (all flavours, chains included)
    pub total_allocated: u64,
    /// Transactions committed
    pub total_committed: u64,
    /// Transactions aborted after `ready()`
    pub total_aborted: u64,
    /// Commit attempts rejected with Conflict
    pub total_conflicts: u64,
    /// Commit attempts rejected with ValidationFailed
    pub total_validation_failures: u64,
    /// Listener registrations currently attached
    pub active_registrations: usize,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Abort rate (aborted / completed)
    pub fn abort_rate(&self) -> f64 {
        let completed = self.total_completed();
        if completed > 0 {
            self.total_aborted as f64 / completed as f64
        } else {
            0.0
        }
    }
}
