//! Transaction Chain Tests
//!
//! - Chained transactions see the previous readied transaction's writes
//! - Commit order across a chain, including pipelined early phases
//! - A failed transaction takes its successors down with it
//! - One open transaction per chain

use crate::common::*;
use treestore::ThreePhaseCommitCohort;

#[test]
fn chain_commits_in_order() {
    let store = new_store();
    let chain = store.create_transaction_chain();

    let mut t1 = chain.new_write_only_transaction().unwrap();
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let mut c1 = t1.ready().unwrap();
    c1.can_commit().unwrap();
    c1.pre_commit().unwrap();

    // t2 builds on t1's writes before t1's real commit completes
    let mut t2 = chain.new_read_write_transaction().unwrap();
    assert_eq!(*t2.read(&path("/a")).unwrap().unwrap(), DataNode::leaf(1));
    t2.merge(&path("/a"), DataNode::leaf(2)).unwrap();
    let mut c2 = t2.ready().unwrap();
    assert!(read(&store, "/a").is_none());

    // t2 validates and prepares before t1's real commit completes
    c2.can_commit().unwrap();
    c2.pre_commit().unwrap();
    c1.commit().unwrap();
    c2.commit().unwrap();

    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(2));
}

/// Chain t1 writes /a, chain t2 writes `t2_path`; both run their early
/// phases, then an outside write to `outside_path` lands before t2 commits
fn pipelined_with_outside_write(
    t2_path: &str,
    outside_path: &str,
) -> (InMemoryDataStore, StoreResult<()>) {
    let store = new_store();
    let chain = store.create_transaction_chain();

    let mut t1 = chain.new_write_only_transaction().unwrap();
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let mut c1 = t1.ready().unwrap();
    c1.can_commit().unwrap();
    c1.pre_commit().unwrap();

    let mut t2 = chain.new_write_only_transaction().unwrap();
    t2.write(&path(t2_path), DataNode::leaf(2)).unwrap();
    let mut c2 = t2.ready().unwrap();
    c2.can_commit().unwrap();
    c2.pre_commit().unwrap();

    c1.commit().unwrap();
    write(&store, outside_path, DataNode::leaf(99));

    let result = c2.commit();
    (store, result)
}

#[test]
fn pipelined_successor_conflicts_with_outside_overlap() {
    let (store, result) = pipelined_with_outside_write("/b", "/b");
    assert!(result.unwrap_err().is_conflict());
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(1));
    assert_eq!(*read(&store, "/b").unwrap(), DataNode::leaf(99));
}

#[test]
fn pipelined_successor_commits_past_disjoint_outside_write() {
    let (store, result) = pipelined_with_outside_write("/b", "/c");
    result.unwrap();
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(1));
    assert_eq!(*read(&store, "/b").unwrap(), DataNode::leaf(2));
    assert_eq!(*read(&store, "/c").unwrap(), DataNode::leaf(99));
}

#[test]
fn successor_of_failed_transaction_never_commits() {
    let store = new_store();
    let chain = store.create_transaction_chain();

    let mut t1 = chain.new_write_only_transaction().unwrap();
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let c1 = t1.ready().unwrap();

    // t2 read t1's /a; its own write is disjoint from everything else
    let mut t2 = chain.new_read_write_transaction().unwrap();
    assert!(t2.exists(&path("/a")).unwrap());
    t2.write(&path("/b"), DataNode::leaf(2)).unwrap();
    let c2 = t2.ready().unwrap();

    write(&store, "/a", DataNode::leaf(99));
    assert!(commit_cohort(c1).unwrap_err().is_conflict());
    assert!(commit_cohort(c2).unwrap_err().is_conflict());

    assert!(read(&store, "/b").is_none());
    let t3 = chain.new_read_only_transaction().unwrap();
    assert!(!t3.exists(&path("/b")).unwrap());
}

#[test]
fn chain_pipelines_many_transactions() {
    let store = new_store();
    let chain = store.create_transaction_chain();
    write(&store, "/log", DataNode::empty_container());

    let mut cohorts = Vec::new();
    for i in 0..5 {
        let mut tx = chain.new_read_write_transaction().unwrap();
        // every earlier entry is already visible
        for j in 0..i {
            let entry = format!("/log/entry[{}]", j);
            assert!(tx.exists(&path(&entry)).unwrap());
        }
        tx.write(&path(&format!("/log/entry[{}]", i)), DataNode::leaf(i as i64))
            .unwrap();
        cohorts.push(tx.ready().unwrap());
    }
    for cohort in cohorts {
        commit_cohort(cohort).unwrap();
    }

    let log = read(&store, "/log").unwrap();
    assert_eq!(log.children().unwrap().len(), 5);
}

#[test]
fn only_one_open_transaction() {
    let store = new_store();
    let chain = store.create_transaction_chain();

    let mut t1 = chain.new_write_only_transaction().unwrap();
    assert!(chain.new_read_only_transaction().unwrap_err().is_illegal_state());

    t1.close();
    let _t2 = chain.new_read_only_transaction().unwrap();
}

#[test]
fn outside_commit_conflicts_with_chain() {
    let store = new_store();
    let chain = store.create_transaction_chain();

    let mut t1 = chain.new_write_only_transaction().unwrap();
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let c1 = t1.ready().unwrap();

    // a transaction outside the chain wins the race for /a
    write(&store, "/a", DataNode::leaf(99));

    assert!(commit_cohort(c1).unwrap_err().is_conflict());
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(99));

    // the aborted transaction no longer shapes the chain's view
    let t2 = chain.new_read_only_transaction().unwrap();
    assert_eq!(*t2.read(&path("/a")).unwrap().unwrap(), DataNode::leaf(99));
}

#[test]
fn closed_chain_rejects_allocation() {
    let store = new_store();
    let chain = store.create_transaction_chain();

    let mut t1 = chain.new_write_only_transaction().unwrap();
    t1.write(&path("/a"), DataNode::leaf(1)).unwrap();
    let c1 = t1.ready().unwrap();
    chain.close();
    chain.close();

    assert!(chain.is_closed());
    assert!(chain.new_write_only_transaction().unwrap_err().is_illegal_state());

    // already readied work can still commit
    commit_cohort(c1).unwrap();
    assert!(read(&store, "/a").is_some());
}

#[test]
fn chained_changes_are_notified_in_order() {
    let store = new_store();
    let recorder = Recorder::new();
    recorder.register(&store, "/a", DataChangeScope::Base);

    let chain = store.create_transaction_chain();
    let mut cohorts = Vec::new();
    for value in 1..=3 {
        let mut tx = chain.new_write_only_transaction().unwrap();
        tx.write(&path("/a"), DataNode::leaf(value)).unwrap();
        cohorts.push(tx.ready().unwrap());
    }
    for cohort in cohorts {
        commit_cohort(cohort).unwrap();
    }

    let events = recorder.take(&store);
    assert_eq!(events.len(), 3);
    assert!(events[0].created().contains_key(&path("/a")));
    assert_eq!(*events[1].updated()[&path("/a")].after, DataNode::leaf(2));
    assert_eq!(*events[2].updated()[&path("/a")].after, DataNode::leaf(3));
}
