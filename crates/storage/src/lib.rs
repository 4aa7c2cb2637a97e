//! Storage layer for treestore
//!
//! This crate implements the copy-on-write data tree the transactional core
//! is built on:
//! - DataTree: the shared, versioned root guarded by an RwLock
//! - DataTreeSnapshot: an immutable, structurally shared view of the root
//! - DataTreeModification: a write overlay recording write/merge/delete
//! - DataTreeCandidate: the diff produced by `prepare` and consumed by
//!   `commit` and by change resolution
//! - Conflict validation (first-committer-wins) and the schema hook

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod candidate;
pub mod modification;
pub mod snapshot;
pub mod tree;
pub mod validation;

pub use candidate::{CandidateNode, DataTreeCandidate, ModificationType};
pub use modification::DataTreeModification;
pub use snapshot::DataTreeSnapshot;
pub use tree::DataTree;
pub use validation::{AcceptAll, ConflictType, SchemaValidator, ValidationResult};
