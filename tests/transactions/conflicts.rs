//! Conflict Detection Tests
//!
//! First committer wins on overlapping paths; disjoint changes both commit.

use crate::common::*;
use treestore::{RetryConfig, ThreePhaseCommitCohort, WriteTransaction};

fn two_writers(store: &InMemoryDataStore) -> (WriteTransaction, WriteTransaction) {
    (
        store.new_write_only_transaction(),
        store.new_write_only_transaction(),
    )
}

#[test]
fn second_writer_of_same_path_conflicts() {
    let store = new_store();
    let (mut t1, mut t2) = two_writers(&store);
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    t2.write(&path("/a"), DataNode::leaf(2)).unwrap();
    let c1 = t1.ready().unwrap();
    let mut c2 = t2.ready().unwrap();

    commit_cohort(c1).unwrap();
    let err = c2.can_commit().unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(err.path(), Some(&path("/a")));

    c2.abort();
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(1));
    assert_eq!(store.metrics().total_conflicts, 1);
}

#[test]
fn overlap_landing_after_can_commit_still_conflicts() {
    let store = new_store();
    write(&store, "/a", DataNode::leaf(0));
    let (mut t1, mut t2) = two_writers(&store);
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    t2.write(&path("/a"), DataNode::leaf(2)).unwrap();
    let c1 = t1.ready().unwrap();
    let mut c2 = t2.ready().unwrap();

    c2.can_commit().unwrap();
    commit_cohort(c1).unwrap();

    assert!(c2.pre_commit().unwrap_err().is_conflict());
    c2.abort();
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(1));
}

#[test]
fn disjoint_writes_both_commit() {
    let store = new_store();
    write(&store, "/c", DataNode::empty_container());

    let (mut t1, mut t2) = two_writers(&store);
    t1.write(&path("/c/x"), DataNode::leaf(1)).unwrap();
    t2.write(&path("/c/y"), DataNode::leaf(2)).unwrap();
    commit_cohort(t1.ready().unwrap()).unwrap();
    commit_cohort(t2.ready().unwrap()).unwrap();

    assert!(read(&store, "/c/x").is_some());
    assert!(read(&store, "/c/y").is_some());
}

#[test]
fn merges_of_different_children_both_commit() {
    let store = new_store();
    write(&store, "/c", DataNode::builder().leaf("x", 0).build());

    let (mut t1, mut t2) = two_writers(&store);
    t1.merge(&path("/c"), DataNode::builder().leaf("y", 1).build())
        .unwrap();
    t2.merge(&path("/c"), DataNode::builder().leaf("z", 2).build())
        .unwrap();
    commit_cohort(t1.ready().unwrap()).unwrap();
    commit_cohort(t2.ready().unwrap()).unwrap();

    let c = read(&store, "/c").unwrap();
    assert_eq!(c.children().unwrap().len(), 3);
}

#[test]
fn write_under_deleted_parent_conflicts() {
    let store = new_store();
    write(&store, "/a", DataNode::empty_container());

    let (mut t1, mut t2) = two_writers(&store);
    t1.delete(&path("/a")).unwrap();
    t2.write(&path("/a/b"), DataNode::leaf(1)).unwrap();
    commit_cohort(t1.ready().unwrap()).unwrap();

    let err = commit_cohort(t2.ready().unwrap()).unwrap_err();
    assert!(err.is_conflict());
    assert!(read(&store, "/a").is_none());
}

#[test]
fn concurrent_creates_conflict() {
    let store = new_store();
    let (mut t1, mut t2) = two_writers(&store);
    t1.write(&path("/new"), DataNode::leaf(1)).unwrap();
    t2.write(&path("/new"), DataNode::leaf(2)).unwrap();
    commit_cohort(t1.ready().unwrap()).unwrap();
    assert!(commit_cohort(t2.ready().unwrap()).unwrap_err().is_conflict());
}

#[test]
fn validation_failure_is_not_retryable() {
    let validator: std::sync::Arc<dyn treestore::SchemaValidator> = std::sync::Arc::new(
        |p: &TreePath, _: &DataNode| -> Result<(), String> {
            if p.to_string().starts_with("/readonly") {
                Err("read-only subtree".to_string())
            } else {
                Ok(())
            }
        },
    );
    let store =
        InMemoryDataStore::with_validator(StoreConfig::named("validated"), validator).unwrap();

    let mut tx = store.new_write_only_transaction();
    tx.write(&path("/readonly"), DataNode::leaf(1)).unwrap();
    let err = commit_cohort(tx.ready().unwrap()).unwrap_err();
    assert!(err.is_validation_failed());
    assert!(!err.is_retryable());

    // retry helper hands the failure back without looping
    let mut attempts = 0;
    let err = store
        .commit_with_retry(RetryConfig::new(), |tx| {
            attempts += 1;
            tx.write(&path("/readonly"), DataNode::leaf(2))
        })
        .unwrap_err();
    assert!(err.is_validation_failed());
    assert_eq!(attempts, 1);
}
