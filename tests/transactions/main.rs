//! Transaction Integration Tests
//!
//! Tests for the transaction lifecycle, snapshot isolation, optimistic
//! conflict detection and transaction chains on a full store.

#[path = "../common/mod.rs"]
mod common;

mod chains;
mod conflicts;
mod lifecycle;
mod stress;
