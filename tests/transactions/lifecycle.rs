//! Transaction Lifecycle Tests
//!
//! - Operations after ready()/close() fail with IllegalState
//! - ready() is single-shot
//! - Closed read-only transactions cannot be read

use crate::common::*;
use treestore::{ThreePhaseCommitCohort, TransactionState};

// ============================================================================
// Write transactions
// ============================================================================

#[test]
fn operations_after_ready_fail() {
    let store = new_store();
    let mut tx = store.new_read_write_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let _cohort = tx.ready().unwrap();
    assert_eq!(tx.state(), TransactionState::Ready);

    assert!(tx.write(&path("/b"), DataNode::leaf(2)).unwrap_err().is_illegal_state());
    assert!(tx.merge(&path("/a"), DataNode::leaf(2)).unwrap_err().is_illegal_state());
    assert!(tx.delete(&path("/a")).unwrap_err().is_illegal_state());
}

#[test]
fn second_ready_fails() {
    let store = new_store();
    let mut tx = store.new_write_only_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let cohort = tx.ready().unwrap();

    let err = tx.ready().unwrap_err();
    assert!(err.is_illegal_state());
    assert!(err.to_string().contains("no longer open"));

    // the first cohort is still usable
    commit_cohort(cohort).unwrap();
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(1));
}

#[test]
fn operations_after_close_fail() {
    let store = new_store();
    let mut tx = store.new_read_write_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    tx.close();
    tx.close();

    assert_eq!(tx.state(), TransactionState::Closed);
    assert!(tx.write(&path("/a"), DataNode::leaf(2)).unwrap_err().is_illegal_state());
    assert!(tx.read(&path("/a")).unwrap_err().is_illegal_state());
    assert!(tx.ready().unwrap_err().is_illegal_state());
    assert!(read(&store, "/a").is_none());
}

#[test]
fn failed_write_leaves_transaction_usable() {
    let store = new_store();
    let mut tx = store.new_read_write_transaction();

    let err = tx.write(&path("/missing/child"), DataNode::leaf(1)).unwrap_err();
    assert!(err.is_illegal_argument());
    let err = tx.write(&path("/list/item[*]"), DataNode::leaf(1)).unwrap_err();
    assert!(err.is_illegal_argument());

    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    commit_cohort(tx.ready().unwrap()).unwrap();
    assert!(store.snapshot().exists(&path("/a")));
}

#[test]
fn ready_transaction_still_reads_its_writes() {
    let store = new_store();
    let mut tx = store.new_read_write_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let cohort = tx.ready().unwrap();

    assert_eq!(*tx.read(&path("/a")).unwrap().unwrap(), DataNode::leaf(1));
    drop(cohort);
}

#[test]
fn dropped_cohort_commits_nothing() {
    let store = new_store();
    let mut tx = store.new_write_only_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    drop(tx.ready().unwrap());
    assert!(read(&store, "/a").is_none());
}

#[test]
fn root_rules_enforced() {
    let store = new_store();
    let mut tx = store.new_write_only_transaction();
    assert!(tx.delete(&TreePath::root()).unwrap_err().is_illegal_argument());
    assert!(tx
        .write(&TreePath::root(), DataNode::leaf(1))
        .unwrap_err()
        .is_illegal_argument());
    tx.write(
        &TreePath::root(),
        DataNode::builder().leaf("a", 1).build(),
    )
    .unwrap();
    commit_cohort(tx.ready().unwrap()).unwrap();
    assert!(store.snapshot().exists(&path("/a")));
}

// ============================================================================
// Read-only transactions
// ============================================================================

#[test]
fn read_after_close_fails() {
    let store = new_store();
    write(&store, "/a", DataNode::leaf(1));

    let mut tx = store.new_read_only_transaction();
    assert!(tx.exists(&path("/a")).unwrap());
    tx.close();
    assert_eq!(tx.state(), TransactionState::Closed);
    assert!(tx.read(&path("/a")).unwrap_err().is_illegal_state());
    assert!(tx.exists(&path("/a")).unwrap_err().is_illegal_state());
}

#[test]
fn identifiers_are_unique_and_prefixed() {
    let store = InMemoryDataStore::new("oper").unwrap();
    let a = store.new_read_only_transaction();
    let b = store.new_write_only_transaction();
    let c = store.new_read_write_transaction();

    assert_ne!(a.id(), b.id());
    assert_ne!(b.id(), c.id());
    assert!(a.id().as_str().starts_with("oper-"));
    assert_eq!(store.metrics().total_allocated, 3);
}

// ============================================================================
// Cohort protocol
// ============================================================================

#[test]
fn manual_three_phase_commit() {
    let store = new_store();
    let mut tx = store.new_write_only_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let mut cohort: Box<dyn ThreePhaseCommitCohort> = tx.ready().unwrap();

    cohort.can_commit().unwrap();
    assert!(read(&store, "/a").is_none());
    cohort.pre_commit().unwrap();
    assert!(read(&store, "/a").is_none());
    cohort.commit().unwrap();
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(1));
    assert_eq!(cohort.transaction_id(), tx.id());
}

#[test]
fn abort_discards_and_repeats_safely() {
    let store = new_store();
    let mut tx = store.new_write_only_transaction();
    tx.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let mut cohort = tx.ready().unwrap();
    cohort.can_commit().unwrap();
    cohort.pre_commit().unwrap();
    cohort.abort();
    cohort.abort();

    assert!(cohort.commit().unwrap_err().is_illegal_state());
    assert!(read(&store, "/a").is_none());

    let metrics = store.metrics();
    assert_eq!(metrics.total_aborted, 1);
    assert_eq!(metrics.total_committed, 0);
}
