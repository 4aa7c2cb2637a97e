//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::{Arc, Once};
pub use treestore::{
    commit_cohort, DataChangeEvent, DataChangeListener, DataChangeScope, DataNode,
    InMemoryDataStore, ListenerRegistrationHandle, StoreConfig, StoreError, StoreResult,
    TreePath, Value,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test subscriber when `TREESTORE_TEST_LOG` is set.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        if std::env::var_os("TREESTORE_TEST_LOG").is_some() {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_test_writer()
                .try_init();
        }
    });
}

/// Fresh store with default settings.
pub fn new_store() -> InMemoryDataStore {
    init_tracing();
    InMemoryDataStore::new("test").expect("Failed to create store")
}

/// Parse a path, panicking on malformed input.
pub fn path(s: &str) -> TreePath {
    s.parse().expect("invalid test path")
}

// ============================================================================
// Writes
// ============================================================================

/// Commit a single write.
pub fn write(store: &InMemoryDataStore, p: &str, data: DataNode) {
    let mut tx = store.new_write_only_transaction();
    tx.write(&path(p), data).expect("write failed");
    commit_cohort(tx.ready().expect("ready failed")).expect("commit failed");
}

/// Commit a single merge.
pub fn merge(store: &InMemoryDataStore, p: &str, data: DataNode) {
    let mut tx = store.new_write_only_transaction();
    tx.merge(&path(p), data).expect("merge failed");
    commit_cohort(tx.ready().expect("ready failed")).expect("commit failed");
}

/// Commit a single delete.
pub fn delete(store: &InMemoryDataStore, p: &str) {
    let mut tx = store.new_write_only_transaction();
    tx.delete(&path(p)).expect("delete failed");
    commit_cohort(tx.ready().expect("ready failed")).expect("commit failed");
}

/// Committed data at `p`.
pub fn read(store: &InMemoryDataStore, p: &str) -> Option<Arc<DataNode>> {
    store.snapshot().read(&path(p))
}

// ============================================================================
// Recording listener
// ============================================================================

/// Listener that keeps every event it receives.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<DataChangeEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> Arc<dyn DataChangeListener> {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: &DataChangeEvent| events.lock().push(event.clone()))
    }

    /// Register on `store` at `p` with `scope`.
    pub fn register(
        &self,
        store: &InMemoryDataStore,
        p: &str,
        scope: DataChangeScope,
    ) -> ListenerRegistrationHandle {
        store
            .register_change_listener(&path(p), scope, self.listener())
            .expect("registration failed")
    }

    pub fn events(&self) -> Vec<DataChangeEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Drain `store` and return the recorded events, clearing them.
    pub fn take(&self, store: &InMemoryDataStore) -> Vec<DataChangeEvent> {
        store.drain_notifications();
        std::mem::take(&mut *self.events.lock())
    }
}

// ============================================================================
// Event assertions
// ============================================================================

pub fn created_paths(event: &DataChangeEvent) -> Vec<String> {
    event.created().keys().map(|p| p.to_string()).collect()
}

pub fn updated_paths(event: &DataChangeEvent) -> Vec<String> {
    event.updated().keys().map(|p| p.to_string()).collect()
}

pub fn removed_paths(event: &DataChangeEvent) -> Vec<String> {
    event.removed().keys().map(|p| p.to_string()).collect()
}

/// Whether any path of `event` is `p`.
pub fn mentions(event: &DataChangeEvent, p: &str) -> bool {
    let p = path(p);
    event.created().contains_key(&p)
        || event.updated().contains_key(&p)
        || event.removed().contains_key(&p)
}
