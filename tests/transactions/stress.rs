//! Stress Tests
//!
//! Many threads incrementing shared counters through commit_with_retry.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;
use treestore::RetryConfig;

fn counter_value(node: Option<Arc<DataNode>>) -> i64 {
    match node.as_deref().and_then(DataNode::value) {
        Some(Value::Int(v)) => *v,
        _ => 0,
    }
}

#[test]
fn concurrent_increments_are_not_lost() {
    const THREADS: usize = 8;
    const INCREMENTS: usize = 25;

    let store = Arc::new(new_store());
    write(&store, "/counter", DataNode::leaf(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let retry = RetryConfig::new()
                    .with_max_retries(1000)
                    .with_base_delay_ms(0)
                    .with_max_delay_ms(1);
                for _ in 0..INCREMENTS {
                    store
                        .commit_with_retry(retry.clone(), |tx| {
                            let current = counter_value(tx.read(&path("/counter"))?);
                            tx.write(&path("/counter"), DataNode::leaf(current + 1))
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = counter_value(read(&store, "/counter"));
    assert_eq!(total, (THREADS * INCREMENTS) as i64);

    let metrics = store.metrics();
    assert_eq!(metrics.total_committed, (THREADS * INCREMENTS) as u64 + 1);
    assert_eq!(metrics.total_conflicts, metrics.total_aborted);
}

#[test]
fn disjoint_writers_never_conflict() {
    const THREADS: usize = 4;

    let store = Arc::new(new_store());
    write(&store, "/slots", DataNode::empty_container());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50 {
                    let slot = format!("/slots/slot[{}-{}]", t, i);
                    write(&store, &slot, DataNode::leaf(i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let slots = read(&store, "/slots").unwrap();
    assert_eq!(slots.children().unwrap().len(), THREADS * 50);
    assert_eq!(store.metrics().total_conflicts, 0);
}

#[test]
fn listener_sees_every_committed_value_in_order() {
    let store = Arc::new(new_store());
    write(&store, "/seq", DataNode::leaf(0));
    let recorder = Recorder::new();
    recorder.register(&store, "/seq", DataChangeScope::Base);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 1..=200 {
                write(&store, "/seq", DataNode::leaf(i));
            }
        })
    };
    writer.join().unwrap();

    let events = recorder.take(&store);
    assert_eq!(events.len(), 201);
    for (i, event) in events.iter().enumerate().skip(1) {
        let update = &event.updated()[&path("/seq")];
        assert_eq!(*update.after, DataNode::leaf(i as i64));
    }
}
