use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::{
    error::{Error, Result},
    sql::{
        executor::ResultSet,
        schema::TableSchema,
        types::{Row, Value},
    },
};

use super::Executor;

fn column_keys(schema: &TableSchema, columns: &[usize]) -> Result<Vec<&'static str>> {
    columns
        .iter()
        .map(|&i| schema.column(i).map(|c| c.key))
        .collect()
}

/// INSERT executor, one prepared statement for all rows
pub struct Insert {
    schema: &'static TableSchema,
    columns: Vec<usize>,
    rows: Vec<Row>,
    upsert: bool,
}

impl Insert {
    pub fn new(
        schema: &'static TableSchema,
        columns: Vec<usize>,
        rows: Vec<Row>,
        upsert: bool,
    ) -> Box<Self> {
        Box::new(Self {
            schema,
            columns,
            rows,
            upsert,
        })
    }
}

impl Executor for Insert {
    fn execute(self: Box<Self>, conn: &Connection) -> Result<ResultSet> {
        let keys = column_keys(self.schema, &self.columns)?;
        let verb = if self.upsert { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = if keys.is_empty() {
            format!("{} INTO {} DEFAULT VALUES", verb, self.schema.name)
        } else {
            let placeholders = vec!["?"; keys.len()].join(", ");
            format!(
                "{} INTO {} ({}) VALUES ({})",
                verb,
                self.schema.name,
                keys.join(", "),
                placeholders
            )
        };
        debug!(%sql, rows = self.rows.len(), "insert");

        let mut stmt = conn.prepare_cached(&sql)?;
        let mut count = 0;
        for row in self.rows.iter() {
            if row.len() != keys.len() {
                return Err(Error::Internal(format!(
                    "table {}: {} columns but {} values",
                    self.schema.name,
                    keys.len(),
                    row.len()
                )));
            }
            stmt.execute(params_from_iter(row.iter()))?;
            count += 1;
        }
        Ok(ResultSet::Insert {
            id: conn.last_insert_rowid(),
            count,
        })
    }
}

/// UPDATE executor, sets columns of the row with the given primary key
pub struct Update {
    schema: &'static TableSchema,
    pk: Value,
    assignments: Vec<(usize, Value)>,
}

impl Update {
    pub fn new(
        schema: &'static TableSchema,
        pk: Value,
        assignments: Vec<(usize, Value)>,
    ) -> Box<Self> {
        Box::new(Self {
            schema,
            pk,
            assignments,
        })
    }
}

impl Executor for Update {
    fn execute(self: Box<Self>, conn: &Connection) -> Result<ResultSet> {
        if self.assignments.is_empty() {
            return Ok(ResultSet::Update { count: 0 });
        }
        let columns = self.assignments.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        let sets = column_keys(self.schema, &columns)?
            .into_iter()
            .map(|key| format!("{} = ?", key))
            .collect::<Vec<_>>();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.schema.name,
            sets.join(", "),
            self.schema.primary_key
        );
        debug!(%sql, pk = %self.pk, "update");

        let params = self
            .assignments
            .iter()
            .map(|(_, v)| v)
            .chain(std::iter::once(&self.pk));
        let count = conn.prepare_cached(&sql)?.execute(params_from_iter(params))?;
        Ok(ResultSet::Update { count })
    }
}

/// DELETE executor, foreign key cascades are left to SQLite
pub struct Delete {
    schema: &'static TableSchema,
    pk: Value,
}

impl Delete {
    pub fn new(schema: &'static TableSchema, pk: Value) -> Box<Self> {
        Box::new(Self { schema, pk })
    }
}

impl Executor for Delete {
    fn execute(self: Box<Self>, conn: &Connection) -> Result<ResultSet> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.schema.name, self.schema.primary_key
        );
        debug!(%sql, pk = %self.pk, "delete");
        let count = conn.prepare_cached(&sql)?.execute([&self.pk])?;
        Ok(ResultSet::Delete { count })
    }
}
