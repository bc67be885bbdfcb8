//! Log table and per-table logging triggers.
//!
//! Every INSERT, UPDATE and DELETE on a tracked table appends one row to
//! the log table holding the operation that reverses it. The trigger fires
//! inside the mutating statement, so data and log never diverge.

use rusqlite::Connection;
use tracing::debug;

use crate::{error::Result, sql::schema::TableSchema};

/// Name of the undo log table
pub const LOG_TABLE: &str = "undolog";

/// Drops and recreates the log table. Undo history does not survive a
/// restart.
pub fn recreate_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {log};
         CREATE TABLE {log} (
             seq INTEGER PRIMARY KEY AUTOINCREMENT,
             scope INTEGER,
             tablename TEXT NOT NULL,
             inverse TEXT NOT NULL
         );
         CREATE INDEX {log}_scope_idx ON {log} (tablename, scope, seq);",
        log = LOG_TABLE
    ))?;
    Ok(())
}

fn scope_expr(schema: &TableSchema, row: &str) -> String {
    match &schema.foreign_key {
        Some(fk) => format!("{}.{}", row, fk.column),
        None => "NULL".to_string(),
    }
}

fn json_keys(keys: &[&str]) -> String {
    let quoted = keys.iter().map(|k| format!("'{}'", k)).collect::<Vec<_>>();
    format!("json_array({})", quoted.join(", "))
}

fn json_values(row: &str, keys: &[&str]) -> String {
    let refs = keys.iter().map(|k| format!("{}.{}", row, k)).collect::<Vec<_>>();
    format!("json_array({})", refs.join(", "))
}

fn trigger_sql(schema: &TableSchema, event: &str, scope: String, inverse: String) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS {table}_undo_{suffix} AFTER {event} ON {table} BEGIN
             INSERT INTO {log} (scope, tablename, inverse) VALUES ({scope}, '{table}', {inverse});
         END;",
        table = schema.name,
        suffix = event.to_lowercase(),
        event = event,
        log = LOG_TABLE,
        scope = scope,
        inverse = inverse,
    )
}

/// The three trigger definitions for a table
pub fn undo_trigger_sql(schema: &TableSchema) -> Vec<String> {
    let pk = schema.primary_key;
    let all = schema
        .stored_columns()
        .into_iter()
        .map(|i| schema.columns[i].key)
        .collect::<Vec<_>>();
    let updatable = all.iter().copied().filter(|&k| k != pk).collect::<Vec<_>>();

    vec![
        trigger_sql(
            schema,
            "INSERT",
            scope_expr(schema, "new"),
            format!("json_object('op', 'delete', 'pk', new.{})", pk),
        ),
        trigger_sql(
            schema,
            "UPDATE",
            scope_expr(schema, "new"),
            format!(
                "json_object('op', 'update', 'pk', old.{}, 'columns', {}, 'values', {})",
                pk,
                json_keys(&updatable),
                json_values("old", &updatable)
            ),
        ),
        trigger_sql(
            schema,
            "DELETE",
            scope_expr(schema, "old"),
            format!(
                "json_object('op', 'insert', 'columns', {}, 'values', {})",
                json_keys(&all),
                json_values("old", &all)
            ),
        ),
    ]
}

/// Installs the logging triggers of a table, idempotent
pub fn create_undo_triggers(conn: &Connection, schema: &TableSchema) -> Result<()> {
    for sql in undo_trigger_sql(schema) {
        debug!(%sql, "create trigger");
        conn.execute_batch(&sql)?;
    }
    Ok(())
}
