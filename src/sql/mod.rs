//! Generic table layer
//!
//! This module provides:
//! - `types`: cell values and their SQLite conversions
//! - `schema`: declarative table and column descriptors
//! - `executor`: statement executors
//! - `engine`: the table engine and column metadata
//! - `undo`: trigger-based undo/redo log
//! - `catalogue`: copies between instance and catalogue tables

pub mod catalogue;
pub mod engine;
pub mod executor;
pub mod schema;
pub mod types;
pub mod undo;
