//! treestore - transactional in-memory tree store with scoped change notification
//!
//! Data lives in an immutable, structurally shared tree addressed by
//! [`TreePath`]s. Writers work in isolated transactions that commit through a
//! three-phase cohort; listeners attach to (optionally wildcarded) paths and
//! receive one [`DataChangeEvent`] per commit that touches their scope.
//!
//! # Quick Start
//!
//! ```ignore
//! use treestore::{commit_cohort, DataChangeScope, DataNode, InMemoryDataStore};
//! use std::sync::Arc;
//!
//! let store = InMemoryDataStore::new("config")?;
//! let handle = store.register_change_listener(
//!     &"/interfaces".parse()?,
//!     DataChangeScope::One,
//!     Arc::new(|event: &treestore::DataChangeEvent| println!("{:?}", event.created())),
//! )?;
//!
//! let mut tx = store.new_write_only_transaction();
//! tx.write(&"/interfaces".parse()?, DataNode::builder().leaf("eth0", "up").build())?;
//! commit_cohort(tx.ready()?)?;
//!
//! store.drain_notifications();
//! handle.close();
//! ```
//!
//! # Architecture
//!
//! - `treestore-core`: paths, tree data and the error taxonomy
//! - `treestore-storage`: the versioned data tree, modifications and candidates
//! - `treestore-concurrency`: transactions, chains and the commit cohort protocol
//! - `treestore-listener`: the listener tree, change resolution and dispatch
//! - `treestore-engine`: the store that ties them together

pub use treestore_concurrency::{
    commit_cohort, ReadTransaction, ReadWriteTransaction, ThreePhaseCommitCohort,
    TransactionChain, TransactionId, TransactionState, WriteTransaction,
};
pub use treestore_core::{
    DataNode, PathArgument, PathParseError, StoreError, StoreResult, TreePath, Value,
};
pub use treestore_engine::{
    InMemoryDataStore, ListenerRegistrationHandle, RetryConfig, StoreConfig, TransactionMetrics,
    CONFIG_FILE_NAME,
};
pub use treestore_listener::{
    DataChangeEvent, DataChangeListener, DataChangeScope, DataUpdate, DispatchStats,
    RegistrationId,
};
pub use treestore_storage::{AcceptAll, DataTreeSnapshot, SchemaValidator};
