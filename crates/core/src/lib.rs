//! Core types for treestore
//!
//! This crate defines the foundational types used throughout the system:
//! - TreePath / PathArgument: hierarchical addressing, with wildcard segments
//!   for listener registrations
//! - DataNode / Value: immutable, structurally shared tree data
//! - StoreError: the error taxonomy shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod node;
pub mod path;

pub use error::{StoreError, StoreResult};
pub use node::{Children, ContainerBuilder, DataNode, Value};
pub use path::{PathArgument, PathParseError, TreePath};
