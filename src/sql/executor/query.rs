use std::{collections::BTreeMap, str::FromStr};

use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::{
    error::{Error, Result},
    sql::{
        executor::ResultSet,
        schema::TableSchema,
        types::{DataType, Row, Value},
    },
};

use super::Executor;

/// Comparison operator of a filter term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Operator {
    fn sql(&self, value: &Value) -> &'static str {
        match (self, value) {
            (Operator::Eq, Value::Null) => "IS",
            (Operator::Ne, Value::Null) => "IS NOT",
            (Operator::Eq, _) => "=",
            (Operator::Ne, _) => "!=",
            (Operator::Lt, _) => "<",
            (Operator::Le, _) => "<=",
            (Operator::Gt, _) => ">",
            (Operator::Ge, _) => ">=",
            (Operator::Like, _) => "LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_uppercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "LIKE" => Operator::Like,
            other => return Err(Error::Parse(format!("unknown operator {}", other))),
        })
    }
}

/// Column index to `(operator, value)`; all terms are ANDed
pub type Filter = BTreeMap<usize, (Operator, Value)>;

/// Table scan executor (SELECT), always ordered by primary key ascending
pub struct Scan {
    schema: &'static TableSchema,
    filter: Filter,
    count_only: bool,
}

impl Scan {
    pub fn new(schema: &'static TableSchema, filter: Filter, count_only: bool) -> Box<Self> {
        Box::new(Self {
            schema,
            filter,
            count_only,
        })
    }

    fn where_clause(&self) -> Result<String> {
        if self.filter.is_empty() {
            return Ok(String::new());
        }
        let terms = self
            .filter
            .iter()
            .map(|(&idx, (op, value))| {
                let expr = self.schema.column_expr(idx)?;
                let exact = self.schema.column(idx)?.datatype == DataType::Decimal
                    && *op != Operator::Like
                    && *value != Value::Null;
                Ok(if exact {
                    format!("dec_cmp({}, ?) {} 0", expr, op.sql(value))
                } else {
                    format!("{} {} ?", expr, op.sql(value))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(" WHERE {}", terms.join(" AND ")))
    }
}

/// Decodes one result row according to the schema's column types
pub fn decode_row(row: &rusqlite::Row<'_>, schema: &TableSchema) -> rusqlite::Result<Row> {
    schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| Ok(Value::from_sql(row.get_ref(i)?, col.datatype)))
        .collect()
}

impl Executor for Scan {
    fn execute(self: Box<Self>, conn: &Connection) -> Result<ResultSet> {
        let where_clause = self.where_clause()?;
        let params = self.filter.values().map(|(_, v)| v);

        if self.count_only {
            let sql = format!("SELECT COUNT(*) {}{}", self.schema.from_sql(), where_clause);
            debug!(%sql, "count");
            let count: i64 = conn
                .prepare_cached(&sql)?
                .query_row(params_from_iter(params), |r| r.get(0))?;
            return Ok(ResultSet::Count {
                count: count as usize,
            });
        }

        let sql = format!(
            "{}{} ORDER BY {}.{} ASC",
            self.schema.select_sql(),
            where_clause,
            self.schema.alias,
            self.schema.primary_key
        );
        debug!(%sql, "scan");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |r| decode_row(r, self.schema))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ResultSet::Scan {
            columns: self.schema.columns.iter().map(|c| c.key.to_string()).collect(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Operator;
    use crate::error::Result;

    #[test]
    fn test_operator_from_str() -> Result<()> {
        assert_eq!(Operator::from_str("=")?, Operator::Eq);
        assert_eq!(Operator::from_str(" like ")?, Operator::Like);
        assert_eq!(Operator::from_str("<>")?, Operator::Ne);
        assert!(Operator::from_str("~").is_err());
        Ok(())
    }
}
