//! Change notification for treestore
//!
//! This crate turns committed diffs into per-observer change events:
//! - ListenerTree: copy-on-write tree of scope-qualified registrations,
//!   with wildcard matching on keyed list entries
//! - DataChangeEvent: created / updated / removed maps plus before/after
//!   subtrees, built incrementally by DataChangeEventBuilder
//! - resolve_changes: walks a candidate against a listener tree snapshot and
//!   produces exactly one event per affected registration
//! - NotificationManager: bounded per-registration FIFO delivery on a pool
//!   of worker threads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod event;
pub mod registration;
pub mod resolve;
pub mod tree;

pub use dispatch::{DispatchError, DispatchStats, NotificationConfig, NotificationManager};
pub use event::{DataChangeEvent, DataChangeEventBuilder, DataChangeScope, DataUpdate};
pub use registration::{DataChangeListener, DataChangeListenerRegistration, RegistrationId};
pub use resolve::{resolve_changes, NotificationTask};
pub use tree::{ListenerNode, ListenerTree, ListenerTreeSnapshot};
