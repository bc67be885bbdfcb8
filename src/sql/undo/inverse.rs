use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::{
        executor::{Delete, Executor, Insert, Update},
        schema::TableSchema,
        types::Value,
    },
};

use super::{Interval, Scope, trigger::LOG_TABLE};

/// Operation reversing one logged mutation. Written by the logging
/// triggers as JSON, interpreted here; no SQL text is ever replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum InverseOp {
    /// Reverses an INSERT
    Delete { pk: i64 },
    /// Reverses an UPDATE, `values` are the old values of `columns`
    Update {
        pk: i64,
        columns: Vec<String>,
        values: Vec<serde_json::Value>,
    },
    /// Reverses a DELETE, primary key included in `columns`
    Insert {
        columns: Vec<String>,
        values: Vec<serde_json::Value>,
    },
}

impl InverseOp {
    /// Builds the executor for this operation. Column names are resolved
    /// against the schema; anything unknown or not stored is rejected.
    pub fn executor(self, schema: &'static TableSchema) -> Result<Box<dyn Executor>> {
        Ok(match self {
            InverseOp::Delete { pk } => Delete::new(schema, Value::Integer(pk)) as Box<dyn Executor>,
            InverseOp::Update {
                pk,
                columns,
                values,
            } => Update::new(
                schema,
                Value::Integer(pk),
                resolve(schema, columns, values)?,
            ),
            InverseOp::Insert { columns, values } => {
                let (columns, row) = resolve(schema, columns, values)?.into_iter().unzip();
                Insert::new(schema, columns, vec![row], false)
            }
        })
    }
}

fn resolve(
    schema: &TableSchema,
    columns: Vec<String>,
    values: Vec<serde_json::Value>,
) -> Result<Vec<(usize, Value)>> {
    if columns.len() != values.len() {
        return Err(Error::Internal(format!(
            "log entry for {} has {} columns but {} values",
            schema.name,
            columns.len(),
            values.len()
        )));
    }
    columns
        .iter()
        .zip(values.iter())
        .map(|(key, value)| {
            let idx = schema.get_col_index(key)?;
            if !schema.columns[idx].is_stored() {
                return Err(Error::Internal(format!(
                    "log entry writes non-stored column {}.{}",
                    schema.name, key
                )));
            }
            Ok((idx, Value::from_json(value)))
        })
        .collect()
}

/// Current maximum log sequence, 0 for an empty log
pub fn max_seq(conn: &Connection) -> Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(seq), 0) FROM {}", LOG_TABLE);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

/// Inverse operations of one table and scope inside `interval`, newest
/// first
pub fn load_entries(
    conn: &Connection,
    table: &str,
    scope: Scope,
    interval: Interval,
) -> Result<Vec<InverseOp>> {
    let sql = format!(
        "SELECT inverse FROM {} \
         WHERE tablename = ?1 AND scope IS ?2 AND seq BETWEEN ?3 AND ?4 \
         ORDER BY seq DESC",
        LOG_TABLE
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let raw = stmt
        .query_map(params![table, scope, interval.begin, interval.end], |r| {
            r.get::<_, String>(0)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    raw.iter()
        .map(|inverse| Ok(serde_json::from_str(inverse)?))
        .collect()
}

/// Number of entries of one table and scope inside `interval`
pub fn count_entries(conn: &Connection, table: &str, scope: Scope, interval: Interval) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} \
         WHERE tablename = ?1 AND scope IS ?2 AND seq BETWEEN ?3 AND ?4",
        LOG_TABLE
    );
    Ok(conn
        .prepare_cached(&sql)?
        .query_row(params![table, scope, interval.begin, interval.end], |r| r.get(0))?)
}

pub fn delete_entries(conn: &Connection, table: &str, scope: Scope, interval: Interval) -> Result<usize> {
    let sql = format!(
        "DELETE FROM {} WHERE tablename = ?1 AND scope IS ?2 AND seq BETWEEN ?3 AND ?4",
        LOG_TABLE
    );
    Ok(conn
        .prepare_cached(&sql)?
        .execute(params![table, scope, interval.begin, interval.end])?)
}
