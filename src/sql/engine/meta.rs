//! Column metadata: display attributes persisted apart from the schema.

use rusqlite::{
    Connection, ErrorCode, OptionalExtension, params,
    types::{FromSql, ToSql},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::Result,
    sql::{schema::TableSchema, types::DataType},
};

use super::Table;

/// Name of the column metadata table
pub const META_TABLE: &str = "column_meta";

const DEFAULT_WIDTH: i64 = 55;

/// Display attributes of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub key: String,
    pub label: String,
    pub datatype: DataType,
    pub col_idx: usize,
    pub col_order: i64,
    pub width: i64,
    pub read_only: bool,
    pub visible: bool,
}

pub fn create_meta_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {meta} (
             tablename TEXT NOT NULL,
             key TEXT NOT NULL,
             label TEXT,
             type TEXT,
             col_idx INTEGER NOT NULL,
             col_order INTEGER,
             width INTEGER DEFAULT {width},
             read_only INTEGER DEFAULT 0,
             visible INTEGER DEFAULT 1,
             UNIQUE (tablename, key),
             UNIQUE (tablename, col_idx)
         )",
        meta = META_TABLE,
        width = DEFAULT_WIDTH,
    ))?;
    Ok(())
}

/// Seeds the schema defaults unless the table already has metadata rows.
/// Rows that collide with existing ones are skipped.
pub(super) fn seed(conn: &Connection, schema: &TableSchema) -> Result<()> {
    let existing: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE tablename = ?", META_TABLE),
        [schema.name],
        |r| r.get(0),
    )?;
    if existing > 0 {
        return Ok(());
    }

    let sql = format!(
        "INSERT INTO {} (tablename, key, label, type, col_idx, col_order, read_only) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
        META_TABLE
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    for (idx, col) in schema.columns.iter().enumerate() {
        let inserted = stmt.execute(params![
            schema.name,
            col.key,
            col.label,
            col.datatype.tag(),
            idx as i64,
            col.read_only
        ]);
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                debug!(table = schema.name, key = col.key, "column metadata already present");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Label,
    Type,
    Width,
    Order,
    ReadOnly,
    Visible,
}

impl Field {
    fn column(&self) -> &'static str {
        match self {
            Field::Label => "label",
            Field::Type => "type",
            Field::Width => "width",
            Field::Order => "col_order",
            Field::ReadOnly => "read_only",
            Field::Visible => "visible",
        }
    }
}

impl Table<'_> {
    fn get_meta<T: FromSql>(&self, field: Field, idx: usize) -> Option<T> {
        let sql = format!(
            "SELECT {} FROM {} WHERE tablename = ? AND col_idx = ?",
            field.column(),
            META_TABLE
        );
        let result = self
            .conn
            .query_row(&sql, params![self.name(), idx as i64], |r| r.get(0))
            .optional()
            .map_err(Into::into);
        self.logged("get_meta", result).flatten()
    }

    fn set_meta<T: ToSql>(&self, field: Field, idx: usize, value: T) -> bool {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE tablename = ? AND col_idx = ?",
            META_TABLE,
            field.column()
        );
        let result = self
            .conn
            .execute(&sql, params![value, self.name(), idx as i64])
            .map_err(Into::into);
        matches!(self.logged("set_meta", result), Some(count) if count > 0)
    }

    pub fn label(&self, idx: usize) -> Option<String> {
        self.get_meta(Field::Label, idx)
    }

    pub fn set_label(&self, idx: usize, label: &str) -> bool {
        self.set_meta(Field::Label, idx, label)
    }

    pub fn column_type(&self, idx: usize) -> Option<DataType> {
        self.get_meta::<String>(Field::Type, idx)
            .and_then(|tag| DataType::from_tag(&tag))
    }

    pub fn set_column_type(&self, idx: usize, datatype: DataType) -> bool {
        self.set_meta(Field::Type, idx, datatype.tag())
    }

    pub fn width(&self, idx: usize) -> Option<i64> {
        self.get_meta(Field::Width, idx)
    }

    pub fn set_width(&self, idx: usize, width: i64) -> bool {
        self.set_meta(Field::Width, idx, width)
    }

    pub fn col_order(&self, idx: usize) -> Option<i64> {
        self.get_meta(Field::Order, idx)
    }

    pub fn set_col_order(&self, idx: usize, order: i64) -> bool {
        self.set_meta(Field::Order, idx, order)
    }

    pub fn is_read_only(&self, idx: usize) -> Option<bool> {
        self.get_meta(Field::ReadOnly, idx)
    }

    pub fn set_read_only(&self, idx: usize, read_only: bool) -> bool {
        self.set_meta(Field::ReadOnly, idx, read_only)
    }

    pub fn is_visible(&self, idx: usize) -> Option<bool> {
        self.get_meta(Field::Visible, idx)
    }

    pub fn set_visible(&self, idx: usize, visible: bool) -> bool {
        self.set_meta(Field::Visible, idx, visible)
    }

    /// Metadata of every column, in display order
    pub fn column_meta(&self) -> Option<Vec<ColumnMeta>> {
        let sql = format!(
            "SELECT key, label, type, col_idx, col_order, width, read_only, visible \
             FROM {} WHERE tablename = ? ORDER BY col_order, col_idx",
            META_TABLE
        );
        let result = self.try_column_meta(&sql);
        self.logged("column_meta", result)
    }

    fn try_column_meta(&self, sql: &str) -> Result<Vec<ColumnMeta>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([self.name()], |r| {
                let col_idx = r.get::<_, i64>(3)? as usize;
                let fallback = self
                    .schema
                    .columns
                    .get(col_idx)
                    .map_or(DataType::String, |c| c.datatype);
                let tag: Option<String> = r.get(2)?;
                Ok(ColumnMeta {
                    key: r.get(0)?,
                    label: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    datatype: tag.as_deref().and_then(DataType::from_tag).unwrap_or(fallback),
                    col_idx,
                    col_order: r.get::<_, Option<i64>>(4)?.unwrap_or(col_idx as i64),
                    width: r.get::<_, Option<i64>>(5)?.unwrap_or(DEFAULT_WIDTH),
                    read_only: r.get::<_, Option<bool>>(6)?.unwrap_or(false),
                    visible: r.get::<_, Option<bool>>(7)?.unwrap_or(true),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
