use std::collections::HashSet;

use crate::{
    error::{Error, Result},
    sql::types::DataType,
};

/// How a column gets its value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnKind {
    /// Plain stored column
    Stored,
    /// Generated column computed by SQLite on every write, `expr` is the
    /// generation expression over the table's own columns
    Generated(&'static str),
    /// Exists only in the SELECT shape (join result, subquery); `expr` is
    /// written against the table alias and the schema's joins
    Computed(&'static str),
}

/// Column schema definition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub key: &'static str,
    /// Default display label, seeded into the column metadata table
    pub label: &'static str,
    pub datatype: DataType,
    pub read_only: bool,
    /// SQL literal used as DEFAULT in the table definition
    pub default: Option<&'static str>,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(key: &'static str, label: &'static str, datatype: DataType) -> Self {
        Self {
            key,
            label,
            datatype,
            read_only: false,
            default: None,
            kind: ColumnKind::Stored,
        }
    }

    pub const fn read_only(self) -> Self {
        Self {
            read_only: true,
            ..self
        }
    }

    pub const fn with_default(self, default: &'static str) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    pub const fn generated(self, expr: &'static str) -> Self {
        Self {
            read_only: true,
            kind: ColumnKind::Generated(expr),
            ..self
        }
    }

    pub const fn computed(self, expr: &'static str) -> Self {
        Self {
            read_only: true,
            kind: ColumnKind::Computed(expr),
            ..self
        }
    }

    pub fn is_stored(&self) -> bool {
        self.kind == ColumnKind::Stored
    }

    /// Column definition inside CREATE TABLE, None for SELECT-only columns
    fn definition(&self) -> Option<String> {
        let sql_type = self.datatype.sql_type();
        match self.kind {
            ColumnKind::Computed(_) => None,
            ColumnKind::Generated(expr) => Some(format!(
                "{} {} GENERATED ALWAYS AS ({}) VIRTUAL",
                self.key, sql_type, expr
            )),
            ColumnKind::Stored => {
                let default = match (self.default, self.datatype) {
                    (Some(d), _) => format!(" DEFAULT {}", d),
                    (None, DataType::Decimal) => " DEFAULT '0.00'".to_string(),
                    (None, _) => String::new(),
                };
                Some(format!("{} {}{}", self.key, sql_type, default))
            }
        }
    }
}

/// The single foreign key a table may declare. Its value is the row's
/// scope; deleting or renumbering the parent row cascades to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
}

/// Declarative table descriptor interpreted by the table engine
#[derive(Debug, PartialEq)]
pub struct TableSchema {
    pub name: &'static str,
    /// Alias of this table inside its SELECT shape
    pub alias: &'static str,
    pub primary_key: &'static str,
    pub foreign_key: Option<ForeignKey>,
    /// Columns of the table's UNIQUE constraint, empty for none
    pub unique: &'static [&'static str],
    pub columns: &'static [Column],
    /// JOIN clauses appended to the SELECT shape
    pub joins: &'static str,
}

impl TableSchema {
    /// Validates the descriptor
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Internal(format!("table {} has no columns", self.name)));
        }

        let mut seen = HashSet::new();
        for col in self.columns.iter() {
            if !seen.insert(col.key) {
                return Err(Error::Internal(format!(
                    "duplicate column {} in table {}",
                    col.key, self.name
                )));
            }
        }

        let pk = &self.columns[self.primary_key_index()?];
        if pk.datatype != DataType::Integer || !pk.is_stored() {
            return Err(Error::Internal(format!(
                "primary key of table {} must be a stored integer",
                self.name
            )));
        }

        if let Some(fk) = &self.foreign_key {
            let col = &self.columns[self.get_col_index(fk.column)?];
            if !col.is_stored() {
                return Err(Error::Internal(format!(
                    "foreign key {} of table {} must be stored",
                    fk.column, self.name
                )));
            }
        }

        for key in self.unique.iter() {
            self.get_col_index(key)?;
        }

        Ok(())
    }

    /// Returns the column index for a given column key
    pub fn get_col_index(&self, key: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.key == key)
            .ok_or(Error::Internal(format!(
                "column {} not found in table {}",
                key, self.name
            )))
    }

    pub fn column(&self, idx: usize) -> Result<&Column> {
        self.columns.get(idx).ok_or(Error::Internal(format!(
            "column index {} out of range for table {}",
            idx, self.name
        )))
    }

    pub fn primary_key_index(&self) -> Result<usize> {
        self.get_col_index(self.primary_key)
    }

    pub fn foreign_key_index(&self) -> Option<usize> {
        self.foreign_key
            .as_ref()
            .and_then(|fk| self.get_col_index(fk.column).ok())
    }

    /// Indices of every stored column, primary key included
    pub fn stored_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&i| self.columns[i].is_stored())
            .collect()
    }

    /// Indices of the columns an INSERT binds
    pub fn insert_columns(&self, includes_key: bool) -> Vec<usize> {
        self.stored_columns()
            .into_iter()
            .filter(|&i| includes_key || self.columns[i].key != self.primary_key)
            .collect()
    }

    /// Stored columns other than the primary key and the foreign key: the
    /// row content shared between a catalogue table and its instance table
    pub fn copy_columns(&self) -> Vec<&'static str> {
        let fk = self.foreign_key.as_ref().map(|fk| fk.column);
        self.columns
            .iter()
            .filter(|c| c.is_stored() && c.key != self.primary_key && Some(c.key) != fk)
            .map(|c| c.key)
            .collect()
    }

    /// Expression selecting column `idx` inside the SELECT shape
    pub fn column_expr(&self, idx: usize) -> Result<String> {
        Ok(self.expr_of(self.column(idx)?))
    }

    fn expr_of(&self, col: &Column) -> String {
        match col.kind {
            ColumnKind::Computed(expr) => expr.to_string(),
            _ => format!("{}.{}", self.alias, col.key),
        }
    }

    pub fn create_sql(&self) -> String {
        let mut defs = Vec::new();
        for col in self.columns.iter() {
            let Some(def) = col.definition() else { continue };
            if col.key == self.primary_key {
                defs.push(format!("{} INTEGER PRIMARY KEY", col.key));
            } else if let Some(fk) = self.foreign_key.as_ref().filter(|fk| fk.column == col.key) {
                defs.push(format!(
                    "{} INTEGER NOT NULL REFERENCES {}(id) ON DELETE CASCADE ON UPDATE CASCADE",
                    col.key, fk.references
                ));
            } else {
                defs.push(def);
            }
        }
        if !self.unique.is_empty() {
            defs.push(format!("UNIQUE ({})", self.unique.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            defs.join(",\n    ")
        )
    }

    pub fn index_sql(&self) -> Option<String> {
        self.foreign_key.as_ref().map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS {}_{}_idx ON {} ({})",
                self.name, fk.column, self.name, fk.column
            )
        })
    }

    /// FROM clause of the SELECT shape, joins included
    pub fn from_sql(&self) -> String {
        let mut sql = format!("FROM {} {}", self.name, self.alias);
        if !self.joins.is_empty() {
            sql.push(' ');
            sql.push_str(self.joins);
        }
        sql
    }

    /// The SELECT shape without WHERE and ORDER BY
    pub fn select_sql(&self) -> String {
        let exprs = self
            .columns
            .iter()
            .map(|c| self.expr_of(c))
            .collect::<Vec<_>>();
        format!("SELECT {} {}", exprs.join(", "), self.from_sql())
    }
}
