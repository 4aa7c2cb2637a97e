//! End-to-End Notification Tests
//!
//! Create, update and remove flowing from commits to a subtree listener.

use crate::common::*;

#[test]
fn create_update_remove_cycle() {
    let store = new_store();
    write(&store, "/x", DataNode::empty_container());
    let recorder = Recorder::new();
    recorder.register(&store, "/x", DataChangeScope::Subtree);
    let initial = recorder.take(&store);
    assert_eq!(initial.len(), 1);
    assert_eq!(created_paths(&initial[0]), vec!["/x"]);

    write(&store, "/x/y", DataNode::leaf("1"));
    let events = recorder.take(&store);
    assert_eq!(events.len(), 1);
    assert_eq!(
        **events[0].created().get(&path("/x/y")).unwrap(),
        DataNode::leaf("1")
    );

    merge(&store, "/x/y", DataNode::leaf("2"));
    let events = recorder.take(&store);
    assert_eq!(events.len(), 1);
    let update = events[0].updated().get(&path("/x/y")).unwrap();
    assert_eq!(*update.before, DataNode::leaf("1"));
    assert_eq!(*update.after, DataNode::leaf("2"));
    assert!(events[0].created().is_empty());

    delete(&store, "/x/y");
    let events = recorder.take(&store);
    assert_eq!(events.len(), 1);
    assert_eq!(removed_paths(&events[0]), vec!["/x/y"]);
    assert_eq!(
        **events[0].original_data(&path("/x/y")).unwrap(),
        DataNode::leaf("2")
    );
}

#[test]
fn event_carries_subtrees_of_registered_node() {
    let store = new_store();
    write(&store, "/x", DataNode::builder().leaf("y", 1).build());
    let recorder = Recorder::new();
    recorder.register(&store, "/x", DataChangeScope::Subtree);
    recorder.take(&store);

    write(&store, "/x/y", DataNode::leaf(2));
    let events = recorder.take(&store);
    assert_eq!(events.len(), 1);

    let before = events[0].original_subtree().unwrap();
    let after = events[0].updated_subtree().unwrap();
    assert_eq!(**before, DataNode::builder().leaf("y", 1).build());
    assert_eq!(**after, DataNode::builder().leaf("y", 2).build());
}

#[test]
fn unrelated_commit_produces_no_event() {
    let store = new_store();
    write(&store, "/x", DataNode::empty_container());
    let recorder = Recorder::new();
    recorder.register(&store, "/x", DataChangeScope::Subtree);
    recorder.take(&store);

    write(&store, "/elsewhere", DataNode::leaf(1));
    assert!(recorder.take(&store).is_empty());
}

#[test]
fn rewriting_identical_data_is_silent() {
    let store = new_store();
    write(&store, "/x", DataNode::builder().leaf("y", 1).build());
    let recorder = Recorder::new();
    recorder.register(&store, "/x", DataChangeScope::Subtree);
    recorder.take(&store);

    write(&store, "/x/y", DataNode::leaf(1));
    assert!(recorder.take(&store).is_empty());
}
