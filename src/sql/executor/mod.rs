use rusqlite::Connection;

use crate::{error::Result, sql::types::Row};

mod mutation;
mod query;

pub use mutation::{Delete, Insert, Update};
pub use query::{Filter, Operator, Scan};

/// Statement executor. Every table engine operation and every replayed
/// undo log entry runs through one of these.
pub trait Executor {
    fn execute(self: Box<Self>, conn: &Connection) -> Result<ResultSet>;
}

/// Execution result set
#[derive(Debug, PartialEq)]
pub enum ResultSet {
    /// `id` is the rowid of the last inserted row
    Insert { id: i64, count: usize },
    Scan { columns: Vec<String>, rows: Vec<Row> },
    Count { count: usize },
    Update { count: usize },
    Delete { count: usize },
}
