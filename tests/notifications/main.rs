//! Notification Integration Tests
//!
//! Tests for listener registration, scope-based event resolution, wildcard
//! paths and per-listener delivery order on a full store.

#[path = "../common/mod.rs"]
mod common;

mod delivery;
mod end_to_end;
mod registration;
