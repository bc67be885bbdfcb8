//! Database handle: one SQLite connection set up for a quoting session.

use std::collections::BTreeMap;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::Result,
    quote::tables,
    sql::{
        engine::{Table, create_meta_table},
        schema::TableSchema,
        undo::trigger::recreate_log_table,
    },
};

pub mod decimal;

/// A named numeric setting read by generated columns at query time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variable {
    pub name: &'static str,
    pub info: &'static str,
    /// Storage encoding written when the variable is first created
    pub default: &'static str,
}

/// The fixed set of variables
pub const VARIABLES: &[Variable] = &[Variable {
    name: "work_cost_rate",
    info: "Standard hourly work cost",
    default: "0.00",
}];

pub const VARIABLES_TABLE: &str = "variables";

/// Owns the connection. Tables are borrowed from it through [`Database::table`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens the configured database and prepares the session: pragmas,
    /// decimal functions, metadata table, an empty undo log and the
    /// variables table.
    pub fn open(config: &Config) -> Result<Self> {
        let seeds = config.seed_values()?;
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let db = Self { conn };
        db.start_session(&seeds)?;
        info!(path = ?config.path, "database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&Config::default())
    }

    fn start_session(&self, seeds: &BTreeMap<&'static str, Decimal>) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA recursive_triggers = ON;")?;
        decimal::register(&self.conn)?;
        create_meta_table(&self.conn)?;
        recreate_log_table(&self.conn)?;

        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                 name TEXT PRIMARY KEY,
                 value TEXT NOT NULL DEFAULT '0.00',
                 info TEXT
             )",
            VARIABLES_TABLE
        ))?;
        let sql = format!(
            "INSERT OR IGNORE INTO {} (name, value, info) VALUES (?, ?, ?)",
            VARIABLES_TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        for var in VARIABLES {
            let value = match seeds.get(var.name) {
                Some(seed) => decimal::to_storage(Some(seed)),
                None => var.default.to_string(),
            };
            stmt.execute(params![var.name, value, var.info])?;
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table(&self, schema: &'static TableSchema) -> Table<'_> {
        Table::new(&self.conn, schema)
    }

    /// Creates every domain table, parents first
    pub fn create_tables(&self) -> Result<()> {
        for schema in tables::ALL {
            self.table(schema).create()?;
        }
        Ok(())
    }

    /// Current value of a variable, `None` for unknown names
    pub fn variable(&self, name: &str) -> Option<Decimal> {
        let sql = format!("SELECT value FROM {} WHERE name = ?", VARIABLES_TABLE);
        match self
            .conn
            .query_row(&sql, [name], |r| Ok(decimal::from_value_ref(r.get_ref(0)?)))
            .optional()
        {
            Ok(value) => value,
            Err(err) => {
                warn!(name, %err, "reading variable failed");
                None
            }
        }
    }

    pub fn set_variable(&self, name: &str, value: Decimal) -> bool {
        let sql = format!("UPDATE {} SET value = ? WHERE name = ?", VARIABLES_TABLE);
        match self
            .conn
            .execute(&sql, params![decimal::to_storage(Some(&value)), name])
        {
            Ok(count) => count > 0,
            Err(err) => {
                warn!(name, %err, "writing variable failed");
                false
            }
        }
    }
}
