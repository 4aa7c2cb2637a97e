//! Transactions for treestore
//!
//! This crate implements the transaction layer on top of the data tree:
//! - ReadTransaction / WriteTransaction / ReadWriteTransaction handles with
//!   an OPEN → READY → CLOSED lifecycle
//! - ThreePhaseCommitCohort: the canCommit / preCommit / commit / abort
//!   participant returned by `ready()`
//! - TransactionChain: transactions whose snapshots link to the previous
//!   readied transaction instead of the committed tree

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod cohort;
pub mod transaction;

pub use chain::{TransactionBackend, TransactionChain};
pub use cohort::{commit_cohort, ThreePhaseCommitCohort};
pub use transaction::{
    ReadTransaction, ReadWriteTransaction, TransactionId, TransactionIdGenerator,
    TransactionReadyHandler, TransactionState, WriteTransaction,
};
