//! Delivery Tests
//!
//! - Per-listener FIFO under bounded queues
//! - A panicking listener does not affect others
//! - Shutdown delivers what is queued and drops the rest

use crate::common::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn bounded_store(depth: usize) -> InMemoryDataStore {
    init_tracing();
    let config = StoreConfig {
        name: "bounded".to_string(),
        notification_workers: 4,
        max_listener_queue_depth: depth,
    };
    InMemoryDataStore::with_config(config).unwrap()
}

#[test]
fn slow_listener_applies_backpressure_in_order() {
    let store = bounded_store(1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn DataChangeListener> = Arc::new(move |event: &DataChangeEvent| {
        thread_sleep_ms(5);
        if let Some(data) = event.created().values().next() {
            sink.lock().push(data.value().cloned());
        }
        for update in event.updated().values() {
            sink.lock().push(update.after.value().cloned());
        }
    });
    store
        .register_change_listener(&path("/v"), DataChangeScope::Base, listener)
        .unwrap();

    for i in 0..10 {
        write(&store, "/v", DataNode::leaf(i));
    }
    store.drain_notifications();

    let expected: Vec<_> = (0..10).map(|i| Some(Value::Int(i))).collect();
    assert_eq!(*seen.lock(), expected);
    let stats = store.notification_stats();
    assert_eq!(stats.delivered, 10);
    assert_eq!(stats.queued, 0);
}

#[test]
fn panicking_listener_is_isolated() {
    let store = new_store();
    let panicking: Arc<dyn DataChangeListener> =
        Arc::new(|_: &DataChangeEvent| panic!("listener failure"));
    store
        .register_change_listener(&path("/a"), DataChangeScope::Base, panicking)
        .unwrap();
    let recorder = Recorder::new();
    recorder.register(&store, "/a", DataChangeScope::Base);

    write(&store, "/a", DataNode::leaf(1));
    write(&store, "/a", DataNode::leaf(2));

    assert_eq!(recorder.take(&store).len(), 2);
    assert_eq!(store.notification_stats().panicked, 2);
}

#[test]
fn listeners_progress_independently() {
    let store = bounded_store(2);
    let slow = Recorder::new();
    let slow_listener = slow.listener();
    let gated: Arc<dyn DataChangeListener> = Arc::new(move |event: &DataChangeEvent| {
        thread_sleep_ms(2);
        slow_listener.on_data_changed(event);
    });
    store
        .register_change_listener(&path("/a"), DataChangeScope::Base, gated)
        .unwrap();
    let fast = Recorder::new();
    fast.register(&store, "/b", DataChangeScope::Base);

    for i in 0..5 {
        write(&store, "/a", DataNode::leaf(i));
        write(&store, "/b", DataNode::leaf(i));
    }
    store.drain_notifications();
    assert_eq!(slow.len(), 5);
    assert_eq!(fast.len(), 5);
}

#[test]
fn shutdown_flushes_then_stops() {
    let store = new_store();
    let recorder = Recorder::new();
    recorder.register(&store, "/a", DataChangeScope::Base);
    for i in 0..3 {
        write(&store, "/a", DataNode::leaf(i));
    }

    store.shutdown();
    assert_eq!(recorder.len(), 3);

    write(&store, "/a", DataNode::leaf(99));
    assert_eq!(*read(&store, "/a").unwrap(), DataNode::leaf(99));
    assert_eq!(recorder.len(), 3);
}

#[test]
fn config_file_drives_store() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join(treestore::CONFIG_FILE_NAME);
    std::fs::write(&file, "name = \"from-file\"\nnotification_workers = 3\n").unwrap();

    let config = StoreConfig::from_file(&file).unwrap();
    let store = InMemoryDataStore::with_config(config).unwrap();
    assert_eq!(store.name(), "from-file");
    assert_eq!(store.notification_stats().worker_count, 3);
    assert!(store
        .new_read_only_transaction()
        .id()
        .as_str()
        .starts_with("from-file-"));
}

fn thread_sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}
