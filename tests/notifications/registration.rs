//! Registration Tests
//!
//! - Initial event with the data present at registration time
//! - close() stops delivery
//! - Registration racing with commits neither misses nor repeats a change

use crate::common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn initial_event_reports_existing_data() {
    let store = new_store();
    write(&store, "/a", DataNode::builder().leaf("b", 1).build());

    let recorder = Recorder::new();
    let handle = recorder.register(&store, "/a", DataChangeScope::One);
    assert_eq!(handle.path(), &path("/a"));
    assert_eq!(handle.scope(), DataChangeScope::One);

    let events = recorder.take(&store);
    assert_eq!(events.len(), 1);
    assert_eq!(created_paths(&events[0]), vec!["/a"]);
    assert_eq!(
        **events[0].updated_subtree().unwrap(),
        DataNode::builder().leaf("b", 1).build()
    );
}

#[test]
fn no_initial_event_without_data() {
    let store = new_store();
    let recorder = Recorder::new();
    recorder.register(&store, "/a", DataChangeScope::Subtree);
    assert!(recorder.take(&store).is_empty());
}

#[test]
fn close_stops_delivery() {
    let store = new_store();
    let recorder = Recorder::new();
    let handle = recorder.register(&store, "/a", DataChangeScope::Base);
    write(&store, "/a", DataNode::leaf(1));
    assert_eq!(recorder.take(&store).len(), 1);

    handle.close();
    assert!(handle.is_closed());
    write(&store, "/a", DataNode::leaf(2));
    assert!(recorder.take(&store).is_empty());

    handle.close();
    assert_eq!(store.metrics().active_registrations, 0);
}

#[test]
fn registrations_are_independent() {
    let store = new_store();
    let first = Recorder::new();
    let second = Recorder::new();
    let h1 = first.register(&store, "/a", DataChangeScope::Base);
    let h2 = second.register(&store, "/a", DataChangeScope::Base);
    assert_ne!(h1.id(), h2.id());
    assert_eq!(store.metrics().active_registrations, 2);

    h1.close();
    write(&store, "/a", DataNode::leaf(1));
    assert!(first.take(&store).is_empty());
    assert_eq!(second.take(&store).len(), 1);
}

#[test]
fn dropping_store_after_handle_is_safe() {
    let store = new_store();
    let recorder = Recorder::new();
    let handle = recorder.register(&store, "/a", DataChangeScope::Base);
    drop(store);
    handle.close();
}

#[test]
fn registration_during_commits_sees_each_value_once() {
    let store = Arc::new(new_store());
    write(&store, "/seq", DataNode::leaf(0));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 1..=300 {
                write(&store, "/seq", DataNode::leaf(i));
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    // register somewhere in the middle of the write stream
    while read(&store, "/seq").map_or(true, |n| *n == DataNode::leaf(0)) {
        thread::yield_now();
    }
    let recorder = Recorder::new();
    recorder.register(&store, "/seq", DataChangeScope::Base);
    writer.join().unwrap();
    assert!(done.load(Ordering::SeqCst));

    let events = recorder.take(&store);
    let initial = match events[0].created()[&path("/seq")].value() {
        Some(Value::Int(v)) => *v,
        other => panic!("unexpected initial value {:?}", other),
    };
    assert_eq!(events.len() as i64, 300 - initial + 1);
    for (offset, event) in events.iter().skip(1).enumerate() {
        let update = &event.updated()[&path("/seq")];
        assert_eq!(*update.before, DataNode::leaf(initial + offset as i64));
        assert_eq!(*update.after, DataNode::leaf(initial + offset as i64 + 1));
    }
}
