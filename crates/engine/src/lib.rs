//! In-memory data store for treestore
//!
//! This crate ties the lower layers together:
//! - InMemoryDataStore: transaction factories, chains, listener
//!   registration and the store's single critical section
//! - StoreCommitCohort: the three-phase commit participant that validates,
//!   prepares, resolves change events and publishes them atomically
//! - TransactionCoordinator: identifier allocation and transaction metrics
//! - StoreConfig: `treestore.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cohort;
pub mod config;
pub mod coordinator;
pub mod retry;
pub mod store;

pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use retry::RetryConfig;
pub use store::{InMemoryDataStore, ListenerRegistrationHandle};
