//! The in-memory data store
//!
//! `InMemoryDataStore` hands out transactions and chains, accepts listener
//! registrations and owns the store's single critical section. Three things
//! happen under that lock and nowhere else:
//!
//! 1. installing a prepared candidate into the data tree
//! 2. enqueuing the candidate's change events
//! 3. registering or unregistering a listener (including enqueuing its
//!    initial event)
//!
//! A listener therefore sees every commit either as part of its initial
//! event or as a change event, never both and never neither.

use crate::cohort::StoreCommitCohort;
use crate::config::StoreConfig;
use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::retry::RetryConfig;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use treestore_concurrency::{
    commit_cohort, ReadTransaction, ReadWriteTransaction, ThreePhaseCommitCohort,
    TransactionBackend, TransactionChain, TransactionId, TransactionReadyHandler,
    WriteTransaction,
};
use treestore_core::{StoreError, StoreResult, TreePath};
use treestore_listener::{
    DataChangeEvent, DataChangeListener, DataChangeListenerRegistration, DataChangeScope,
    DispatchStats, ListenerTree, NotificationManager, NotificationTask, RegistrationId,
};
use treestore_storage::{DataTree, DataTreeModification, DataTreeSnapshot, SchemaValidator};

/// Shared state behind a store handle
pub(crate) struct StoreInner {
    pub(crate) name: String,
    pub(crate) data_tree: DataTree,
    pub(crate) listeners: ListenerTree,
    /// The store's single critical section
    pub(crate) commit_lock: Mutex<()>,
    pub(crate) notifications: NotificationManager,
    pub(crate) coordinator: TransactionCoordinator,
}

/// Transaction backend bound to one store
struct StoreBackend {
    inner: Arc<StoreInner>,
}

impl TransactionReadyHandler for StoreBackend {
    fn transaction_ready(
        &self,
        id: TransactionId,
        modification: DataTreeModification,
    ) -> Box<dyn ThreePhaseCommitCohort> {
        debug!(target: "treestore::txn", txn_id = %id, "Creating commit cohort");
        Box::new(StoreCommitCohort::new(
            id,
            Arc::clone(&self.inner),
            modification,
        ))
    }
}

impl TransactionBackend for StoreBackend {
    fn next_transaction_id(&self) -> TransactionId {
        self.inner.coordinator.next_txn_id()
    }

    fn snapshot(&self) -> DataTreeSnapshot {
        self.inner.data_tree.snapshot()
    }
}

/// Transactional in-memory tree store with change notification
///
/// # Example
///
/// ```ignore
/// let store = InMemoryDataStore::new("config")?;
///
/// let mut tx = store.new_write_only_transaction();
/// tx.write(&"/a".parse()?, DataNode::leaf(1))?;
/// commit_cohort(tx.ready()?)?;
///
/// let tx = store.new_read_only_transaction();
/// assert!(tx.exists(&"/a".parse()?)?);
/// ```
pub struct InMemoryDataStore {
    inner: Arc<StoreInner>,
    backend: Arc<StoreBackend>,
}

impl std::fmt::Debug for InMemoryDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDataStore")
            .field("name", &self.inner.name)
            .field("version", &self.inner.data_tree.version())
            .finish()
    }
}

impl InMemoryDataStore {
    /// Create a store with default settings
    pub fn new(name: impl Into<String>) -> StoreResult<Self> {
        Self::with_config(StoreConfig::named(name))
    }

    /// Create a store from a config
    ///
    /// # Errors
    ///
    /// IllegalArgument if the config is invalid; Unexpected if the
    /// notification workers cannot be started.
    pub fn with_config(config: StoreConfig) -> StoreResult<Self> {
        Self::build(config, DataTree::new())
    }

    /// Create a store whose commits are checked by `validator`
    pub fn with_validator(
        config: StoreConfig,
        validator: Arc<dyn SchemaValidator>,
    ) -> StoreResult<Self> {
        Self::build(config, DataTree::with_validator(validator))
    }

    fn build(config: StoreConfig, data_tree: DataTree) -> StoreResult<Self> {
        config.validate()?;
        let notifications = NotificationManager::new(config.notification_config())?;

        let inner = Arc::new(StoreInner {
            coordinator: TransactionCoordinator::new(&config.name),
            name: config.name,
            data_tree,
            listeners: ListenerTree::new(),
            commit_lock: Mutex::new(()),
            notifications,
        });
        info!(
            target: "treestore::txn",
            store = %inner.name,
            workers = config.notification_workers,
            "Store created"
        );
        Ok(InMemoryDataStore {
            backend: Arc::new(StoreBackend {
                inner: Arc::clone(&inner),
            }),
            inner,
        })
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the committed tree
    pub fn snapshot(&self) -> DataTreeSnapshot {
        self.inner.data_tree.snapshot()
    }

    fn handler(&self) -> Arc<dyn TransactionReadyHandler> {
        Arc::clone(&self.backend) as Arc<dyn TransactionReadyHandler>
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// New read-only transaction over the current committed tree
    pub fn new_read_only_transaction(&self) -> ReadTransaction {
        ReadTransaction::new(self.inner.coordinator.next_txn_id(), self.snapshot(), None)
    }

    /// New read-write transaction over the current committed tree
    pub fn new_read_write_transaction(&self) -> ReadWriteTransaction {
        ReadWriteTransaction::new(
            self.inner.coordinator.next_txn_id(),
            &self.snapshot(),
            self.handler(),
        )
    }

    /// New write-only transaction over the current committed tree
    pub fn new_write_only_transaction(&self) -> WriteTransaction {
        WriteTransaction::new(
            self.inner.coordinator.next_txn_id(),
            &self.snapshot(),
            self.handler(),
        )
    }

    /// New transaction chain backed by this store
    pub fn create_transaction_chain(&self) -> TransactionChain {
        TransactionChain::new(Arc::clone(&self.backend) as Arc<dyn TransactionBackend>)
    }

    /// Run `f` in a fresh read-write transaction and commit it, retrying on
    /// Conflict
    ///
    /// The closure runs once per attempt. Errors from the closure and
    /// non-conflict commit failures are returned immediately.
    pub fn commit_with_retry<F, T>(&self, config: RetryConfig, mut f: F) -> StoreResult<T>
    where
        F: FnMut(&mut ReadWriteTransaction) -> StoreResult<T>,
    {
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            let mut tx = self.new_read_write_transaction();
            let value = f(&mut tx)?;
            let cohort = tx.ready()?;

            match commit_cohort(cohort) {
                Ok(()) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < config.max_retries => {
                    debug!(
                        target: "treestore::txn",
                        attempt,
                        error = %e,
                        "Retrying conflicting transaction"
                    );
                    last_error = Some(e);
                    std::thread::sleep(config.calculate_delay(attempt));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StoreError::unexpected("retry loop exited without returning a result")
        }))
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Attach `listener` at `path` with `scope`
    ///
    /// Before this returns, an initial event carrying the current data at
    /// `path` as created is queued for the listener (all matching entries
    /// for a wildcard path). Nothing is queued if no data exists there.
    pub fn register_change_listener(
        &self,
        path: &TreePath,
        scope: DataChangeScope,
        listener: Arc<dyn DataChangeListener>,
    ) -> StoreResult<ListenerRegistrationHandle> {
        let _guard = self.inner.commit_lock.lock();

        let registration = self.inner.listeners.register(path.clone(), scope, listener);
        let snapshot = self.inner.data_tree.snapshot();
        let initial = if path.contains_wildcard() {
            snapshot.find_matching(path)
        } else {
            snapshot
                .read(path)
                .map(|data| vec![(path.clone(), data)])
                .unwrap_or_default()
        };

        if !initial.is_empty() {
            let mut event = DataChangeEvent::builder(DataChangeScope::Base);
            if !path.contains_wildcard() {
                event.set_after(initial.first().map(|(_, data)| Arc::clone(data)));
            }
            for (path, data) in initial {
                event.add_created(path, data);
            }
            let task = NotificationTask::new(Arc::clone(&registration), event.build());
            if let Err(e) = self.inner.notifications.submit(task) {
                self.inner.listeners.unregister(&registration);
                return Err(e.into());
            }
        }

        Ok(ListenerRegistrationHandle {
            registration,
            store: Arc::downgrade(&self.inner),
        })
    }

    /// Block until every queued change event has been delivered
    pub fn drain_notifications(&self) {
        self.inner.notifications.drain();
    }

    /// Deliver outstanding events and stop the notification workers
    ///
    /// Transactions keep working afterwards but no further events are
    /// delivered. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.notifications.is_shut_down() {
            return;
        }
        self.inner.notifications.drain();
        self.inner.notifications.shutdown();
        info!(target: "treestore::txn", store = %self.inner.name, "Store shut down");
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Transaction and registration counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.inner
            .coordinator
            .metrics(self.inner.listeners.registration_count())
    }

    /// Notification dispatcher counters
    pub fn notification_stats(&self) -> DispatchStats {
        self.inner.notifications.stats()
    }
}

/// Handle returned by [`InMemoryDataStore::register_change_listener`]
///
/// Dropping the handle leaves the listener registered; call
/// [`close`](Self::close) to remove it.
pub struct ListenerRegistrationHandle {
    registration: Arc<DataChangeListenerRegistration>,
    store: Weak<StoreInner>,
}

impl std::fmt::Debug for ListenerRegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistrationHandle")
            .field("registration", &self.registration)
            .finish()
    }
}

impl ListenerRegistrationHandle {
    /// Registration identifier
    pub fn id(&self) -> RegistrationId {
        self.registration.id()
    }

    /// Registered path
    pub fn path(&self) -> &TreePath {
        self.registration.path()
    }

    /// Registered scope
    pub fn scope(&self) -> DataChangeScope {
        self.registration.scope()
    }

    /// Whether the registration has been closed
    pub fn is_closed(&self) -> bool {
        self.registration.is_closed()
    }

    /// Unregister the listener. Idempotent.
    ///
    /// Events already queued for it are dropped; a commit that is resolving
    /// concurrently is not disturbed.
    pub fn close(&self) {
        // once the store is gone nothing can deliver to the listener anyway
        if let Some(store) = self.store.upgrade() {
            let _guard = store.commit_lock.lock();
            store.listeners.unregister(&self.registration);
        }
    }
}
