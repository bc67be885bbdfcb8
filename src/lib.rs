//! cabquote - persistence core of a cabinetry quoting tool
//!
//! This crate provides:
//! - An exact-decimal bridge into SQLite (storage encoding, SQL functions)
//! - A schema-driven table engine with column metadata
//! - Trigger-based undo/redo history scoped per parent key
//! - Catalogue pairing between offer rows and reusable rows
//! - Part formulas recomputing dimensions and costs from sibling rows

pub mod config;
pub mod error;
pub mod formula;
pub mod quote;
pub mod sql;
pub mod storage;
