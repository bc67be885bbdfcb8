//! Table engine: schema-driven CRUD over one SQLite table.
//!
//! A [`Table`] is a cheap handle pairing a connection with a static
//! [`TableSchema`]. Every routine operation goes through an [`Executor`]
//! and reports failure as `None`/`false` with a warning, never as an error.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    sql::{
        executor::{Delete, Executor, Filter, Insert, Operator, ResultSet, Scan, Update},
        schema::TableSchema,
        types::{Row, Value},
        undo::trigger::create_undo_triggers,
    },
};

mod meta;

pub use meta::{ColumnMeta, META_TABLE, create_meta_table};

/// Handle on one table of the database
#[derive(Clone, Copy)]
pub struct Table<'a> {
    conn: &'a Connection,
    schema: &'static TableSchema,
}

impl<'a> Table<'a> {
    pub fn new(conn: &'a Connection, schema: &'static TableSchema) -> Self {
        Self { conn, schema }
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// Creates the table, its foreign key index and its logging triggers,
    /// then seeds the column metadata. Idempotent.
    pub fn create(&self) -> Result<()> {
        self.schema.validate()?;
        let sql = self.schema.create_sql();
        debug!(%sql, "create table");
        self.conn.execute_batch(&sql)?;
        if let Some(sql) = self.schema.index_sql() {
            self.conn.execute_batch(&sql)?;
        }
        create_undo_triggers(self.conn, self.schema)?;
        meta::seed(self.conn, self.schema)?;
        info!(table = self.name(), "table ready");
        Ok(())
    }

    /// Inserts one row. `values` must line up with the insertable columns,
    /// primary key first when `includes_key`. Returns the new row id.
    pub fn insert(&self, values: Row, includes_key: bool, upsert: bool) -> Option<i64> {
        let result = self.try_insert(vec![values], includes_key, upsert);
        self.logged("insert", result)
    }

    /// Inserts several rows in one transaction
    pub fn insert_many(&self, rows: Vec<Row>, includes_key: bool, upsert: bool) -> bool {
        let result = self.conn.unchecked_transaction().map_err(Error::from).and_then(|tx| {
            self.try_insert(rows, includes_key, upsert)?;
            Ok(tx.commit()?)
        });
        self.logged("insert_many", result).is_some()
    }

    /// Inserts a row of schema defaults, bound to `scope` when the table
    /// has a foreign key. Returns the new primary key.
    pub fn insert_empty(&self, scope: Option<i64>) -> Option<i64> {
        let (columns, row) = match self.schema.foreign_key_index() {
            Some(fk) => (vec![fk], vec![Value::from(scope)]),
            None => (vec![], vec![]),
        };
        let result = Insert::new(self.schema, columns, vec![row], false)
            .execute(self.conn)
            .and_then(inserted_id);
        self.logged("insert_empty", result)
    }

    /// Sets one column of the row with primary key `pk`. False when no row
    /// changed or the write was rejected.
    pub fn update(&self, pk: i64, column: usize, value: Value) -> bool {
        let result = self.try_update(pk, vec![(column, value)]);
        matches!(self.logged("update", result), Some(count) if count > 0)
    }

    /// Applies several multi-column updates keyed by primary key in one
    /// transaction
    pub fn update_many(&self, updates: Vec<(i64, Vec<(usize, Value)>)>) -> bool {
        let result = self.conn.unchecked_transaction().map_err(Error::from).and_then(|tx| {
            for (pk, assignments) in updates {
                self.try_update(pk, assignments)?;
            }
            Ok(tx.commit()?)
        });
        self.logged("update_many", result).is_some()
    }

    pub fn delete(&self, pk: i64) -> bool {
        let result = Delete::new(self.schema, Value::Integer(pk))
            .execute(self.conn)
            .and_then(|rs| match rs {
                ResultSet::Delete { count } => Ok(count),
                other => Err(unexpected(other)),
            });
        matches!(self.logged("delete", result), Some(count) if count > 0)
    }

    /// Rows matching `scope` and `filter`, ordered by primary key
    pub fn select(&self, scope: Option<i64>, filter: Option<Filter>) -> Option<Vec<Row>> {
        let result = Scan::new(self.schema, self.scoped(scope, filter), false)
            .execute(self.conn)
            .and_then(|rs| match rs {
                ResultSet::Scan { rows, .. } => Ok(rows),
                other => Err(unexpected(other)),
            });
        self.logged("select", result)
    }

    /// Number of rows `select` would return
    pub fn count(&self, scope: Option<i64>, filter: Option<Filter>) -> Option<usize> {
        let result = Scan::new(self.schema, self.scoped(scope, filter), true)
            .execute(self.conn)
            .and_then(|rs| match rs {
                ResultSet::Count { count } => Ok(count),
                other => Err(unexpected(other)),
            });
        self.logged("count", result)
    }

    /// Row with primary key `pk`
    pub fn get(&self, pk: i64) -> Option<Row> {
        let idx = self.logged("get", self.schema.primary_key_index())?;
        let filter = Filter::from([(idx, (Operator::Eq, Value::Integer(pk)))]);
        self.select(None, Some(filter))?.into_iter().next()
    }

    /// Keeps the values of the insertable columns, primary key excluded
    pub fn format_for_insert(&self, row: &Row) -> Row {
        self.schema
            .insert_columns(false)
            .into_iter()
            .filter_map(|i| row.get(i).cloned())
            .collect()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.columns.len()
    }

    fn scoped(&self, scope: Option<i64>, filter: Option<Filter>) -> Filter {
        let mut filter = filter.unwrap_or_default();
        if let (Some(scope), Some(fk)) = (scope, self.schema.foreign_key_index()) {
            filter.insert(fk, (Operator::Eq, Value::Integer(scope)));
        }
        filter
    }

    fn try_insert(&self, rows: Vec<Row>, includes_key: bool, upsert: bool) -> Result<i64> {
        let columns = self.schema.insert_columns(includes_key);
        Insert::new(self.schema, columns, rows, upsert)
            .execute(self.conn)
            .and_then(inserted_id)
    }

    fn try_update(&self, pk: i64, assignments: Vec<(usize, Value)>) -> Result<usize> {
        match Update::new(self.schema, Value::Integer(pk), assignments).execute(self.conn)? {
            ResultSet::Update { count } => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    fn logged<T>(&self, op: &'static str, result: Result<T>) -> Option<T> {
        result
            .map_err(|err| warn!(table = self.name(), op, %err, "table operation failed"))
            .ok()
    }
}

fn inserted_id(rs: ResultSet) -> Result<i64> {
    match rs {
        ResultSet::Insert { id, .. } => Ok(id),
        other => Err(unexpected(other)),
    }
}

fn unexpected(rs: ResultSet) -> Error {
    Error::Internal(format!("unexpected result set {:?}", rs))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::Table;
    use crate::{
        error::Result,
        quote::tables::{GROUP_MATERIALS, GROUPS, MATERIALS, OFFERS},
        sql::{
            executor::{Filter, Operator},
            types::Value,
        },
        storage::Database,
    };

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    fn group(db: &Database) -> i64 {
        let offer = db.table(&OFFERS).insert_empty(None).unwrap();
        db.table(&GROUPS).insert_empty(Some(offer)).unwrap()
    }

    #[test]
    fn test_create_idempotent() -> Result<()> {
        let db = Database::open_in_memory()?;
        let materials = db.table(&MATERIALS);
        materials.create()?;
        materials.create()?;
        assert_eq!(materials.count(None, None), Some(0));
        Ok(())
    }

    #[test]
    fn test_insert_select_ordering() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let offers = db.table(&OFFERS);
        let name = OFFERS.get_col_index("name")?;

        let mut row = vec![Value::Null; OFFERS.columns.len()];
        row[name] = Value::from("kitchen");
        let first = offers.insert(offers.format_for_insert(&row), false, false).unwrap();
        row[name] = Value::from("bathroom");
        let second = offers.insert(offers.format_for_insert(&row), false, false).unwrap();
        assert!(first < second);

        let rows = offers.select(None, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][name], Value::from("kitchen"));
        assert_eq!(rows[1][name], Value::from("bathroom"));

        let filter = Filter::from([(name, (Operator::Like, Value::from("bath%")))]);
        let rows = offers.select(None, Some(filter)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(offers.count(None, None), Some(2));
        Ok(())
    }

    #[test]
    fn test_scope_and_filter() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let (a, b) = (group(&db), group(&db));
        let materials = db.table(&GROUP_MATERIALS);
        let cost = GROUP_MATERIALS.get_col_index("cost")?;

        for (scope, price) in [(a, "1.00"), (a, "10.00"), (b, "70.00")] {
            let id = materials.insert_empty(Some(scope)).unwrap();
            assert!(materials.update(id, cost, dec(price)));
        }
        assert_eq!(materials.count(Some(a), None), Some(2));
        assert_eq!(materials.count(Some(b), None), Some(1));

        // Decimal terms compare numerically, not as text
        let filter = Filter::from([(cost, (Operator::Gt, dec("9.00")))]);
        let rows = materials.select(Some(a), Some(filter)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][cost], dec("10.00"));

        let filter = Filter::from([(cost, (Operator::Eq, dec("10")))]);
        assert_eq!(materials.count(None, Some(filter)), Some(1));
        Ok(())
    }

    #[test]
    fn test_failures_are_values() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let g = group(&db);
        let materials = db.table(&GROUP_MATERIALS);
        let name = GROUP_MATERIALS.get_col_index("name")?;
        let tot_cost = GROUP_MATERIALS.get_col_index("tot_cost")?;

        // Foreign key is NOT NULL
        assert_eq!(materials.insert_empty(None), None);

        let first = materials.insert_empty(Some(g)).unwrap();
        let second = materials.insert_empty(Some(g)).unwrap();
        assert!(materials.update(first, name, Value::from("oak")));
        // UNIQUE (group_id, name)
        assert!(!materials.update(second, name, Value::from("oak")));
        // Generated column
        assert!(!materials.update(first, tot_cost, dec("1.00")));
        // Missing row
        assert!(!materials.update(9999, name, Value::from("pine")));
        assert!(!materials.delete(9999));
        assert!(materials.delete(second));
        assert!(materials.get(second).is_none());
        Ok(())
    }

    #[test]
    fn test_cascade_delete() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let offer = db.table(&OFFERS).insert_empty(None).unwrap();
        let groups = db.table(&GROUPS);
        let g = groups.insert_empty(Some(offer)).unwrap();
        let materials = db.table(&GROUP_MATERIALS);
        materials.insert_empty(Some(g)).unwrap();

        assert!(db.table(&OFFERS).delete(offer));
        assert_eq!(groups.count(None, None), Some(0));
        assert_eq!(materials.count(None, None), Some(0));
        Ok(())
    }

    #[test]
    fn test_many() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let materials = db.table(&MATERIALS);
        let name = MATERIALS.get_col_index("name")?;
        let cost = MATERIALS.get_col_index("cost")?;

        let rows = ["oak", "pine", "birch"]
            .into_iter()
            .map(|n| {
                let mut row = vec![Value::Null; MATERIALS.columns.len()];
                row[name] = Value::from(n);
                row[cost] = dec("2.00");
                materials.format_for_insert(&row)
            })
            .collect::<Vec<_>>();
        assert!(materials.insert_many(rows.clone(), false, false));
        assert_eq!(materials.count(None, None), Some(3));

        // A failing batch leaves nothing behind
        assert!(!materials.insert_many(rows, false, false));
        assert_eq!(materials.count(None, None), Some(3));

        let ids = materials
            .select(None, None)
            .unwrap()
            .into_iter()
            .map(|r| r[0].as_i64().unwrap())
            .collect::<Vec<_>>();
        let updates = ids.iter().map(|&id| (id, vec![(cost, dec("3.50"))])).collect();
        assert!(materials.update_many(updates));
        assert!(
            materials
                .select(None, None)
                .unwrap()
                .iter()
                .all(|r| r[cost] == dec("3.50"))
        );
        Ok(())
    }

    #[test]
    fn test_upsert_with_key() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let offers = Table::new(db.connection(), &OFFERS);
        let name = OFFERS.get_col_index("name")?;
        let id = offers.insert_empty(None).unwrap();

        let mut row = offers.get(id).unwrap();
        row[name] = Value::from("replaced");
        let values = OFFERS
            .insert_columns(true)
            .into_iter()
            .map(|i| row[i].clone())
            .collect();
        assert_eq!(offers.insert(values, true, true), Some(id));
        assert_eq!(offers.get(id).unwrap()[name], Value::from("replaced"));
        assert_eq!(offers.count(None, None), Some(1));
        Ok(())
    }
}
