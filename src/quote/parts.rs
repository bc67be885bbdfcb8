//! Formula pass over the parts of one product.
//!
//! Width, length and cost of a part may be driven by the formulas in
//! `code_width`, `code_length` and `code_cost`. [`recompute`] evaluates
//! them for every part of a product and writes back what changed.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    formula::Formula,
    sql::{
        engine::Table,
        schema::TableSchema,
        types::{Row, Value},
    },
};

/// Names a formula may use. Each reads the part column of the same name.
pub const KEYWORDS: &[&str] = &[
    "quantity",
    "width",
    "length",
    "cost",
    "mthickness",
    "mcost",
    "pwidth",
    "pheight",
    "pdepth",
];

/// Derived fields and their formula columns, in evaluation order
const DERIVED: &[(&str, &str)] = &[
    ("width", "code_width"),
    ("length", "code_length"),
    ("cost", "code_cost"),
];

/// Column positions the pass needs, resolved once per call
struct Layout {
    pk: usize,
    name: usize,
    keywords: Vec<(&'static str, usize)>,
    derived: Vec<(usize, usize)>,
}

impl Layout {
    fn of(schema: &TableSchema) -> Result<Self> {
        Ok(Self {
            pk: schema.primary_key_index()?,
            name: schema.get_col_index("name")?,
            keywords: KEYWORDS
                .iter()
                .map(|&k| -> Result<_> { Ok((k, schema.get_col_index(k)?)) })
                .collect::<Result<_>>()?,
            derived: DERIVED
                .iter()
                .map(|&(field, code)| -> Result<_> {
                    Ok((schema.get_col_index(field)?, schema.get_col_index(code)?))
                })
                .collect::<Result<_>>()?,
        })
    }

    /// Value of `field` in the row named `row`, or in the current row when
    /// no row is named or no row has that name. NULL reads as zero.
    fn resolve(&self, rows: &[Row], current: usize, row: Option<&str>, field: &str) -> Result<Decimal> {
        let col = self
            .keywords
            .iter()
            .find(|(k, _)| *k == field)
            .map(|&(_, i)| i)
            .ok_or(Error::Eval(format!("unresolved name {}", field)))?;
        let target = row
            .and_then(|name| rows.iter().find(|r| r[self.name].as_str() == Some(name)))
            .unwrap_or(&rows[current]);
        match &target[col] {
            Value::Null => Ok(Decimal::ZERO),
            value => value
                .as_decimal()
                .ok_or(Error::Eval(format!("{} is not a number: {}", field, value))),
        }
    }

    /// Evaluates the formula in column `code` of the current row. `None`
    /// when the cell holds no formula or evaluation failed.
    fn evaluate(&self, rows: &[Row], current: usize, code: usize) -> Option<Decimal> {
        let text = rows[current][code].as_str()?;
        let result = Formula::parse(text).and_then(|formula| match formula {
            Some(f) => f
                .evaluate(&|row: Option<&str>, field: &str| self.resolve(rows, current, row, field))
                .map(Some),
            None => Ok(None),
        });
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(formula = text, %err, "formula not evaluated");
                None
            }
        }
    }
}

/// Recomputes the formula-driven fields of every part of product `scope`
/// and persists the ones that changed. Rows are processed in primary key
/// order; a computed value is visible to later rows and to the row's own
/// later fields. Returns the parts as stored afterwards.
pub fn recompute(table: &Table<'_>, scope: i64) -> Option<Vec<Row>> {
    let layout = match Layout::of(table.schema()) {
        Ok(layout) => layout,
        Err(err) => {
            warn!(table = table.name(), %err, "table has no part layout");
            return None;
        }
    };

    let mut rows = table.select(Some(scope), None)?;
    let mut changes: BTreeMap<i64, Vec<(usize, Value)>> = BTreeMap::new();
    for current in 0..rows.len() {
        for &(field, code) in layout.derived.iter() {
            let Some(value) = layout.evaluate(&rows, current, code) else {
                continue;
            };
            if rows[current][field].as_decimal() == Some(value) {
                continue;
            }
            rows[current][field] = Value::Decimal(value);
            if let Some(pk) = rows[current][layout.pk].as_i64() {
                changes.entry(pk).or_default().push((field, Value::Decimal(value)));
            }
        }
    }

    if !changes.is_empty() {
        debug!(table = table.name(), scope, rows = changes.len(), "formula results changed");
        if !table.update_many(changes.into_iter().collect()) {
            return None;
        }
    }
    table.select(Some(scope), None)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::recompute;
    use crate::{
        error::Result,
        quote::tables::{GROUP_MATERIALS, GROUP_PARTS, GROUP_PRODUCTS, GROUPS, OFFERS, PARTS, PRODUCTS},
        sql::{engine::Table, schema::TableSchema, types::Value, undo::inverse::max_seq},
        storage::Database,
    };

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    /// Inserts a row under `scope` and sets the given fields
    fn row(table: &Table<'_>, scope: Option<i64>, fields: &[(&str, Value)]) -> i64 {
        let id = table.insert_empty(scope).unwrap();
        for (key, value) in fields {
            let idx = table.schema().get_col_index(key).unwrap();
            assert!(table.update(id, idx, value.clone()), "set {}", key);
        }
        id
    }

    fn field(schema: &TableSchema, rows: &[Vec<Value>], name: &str, key: &str) -> Value {
        let n = schema.get_col_index("name").unwrap();
        let k = schema.get_col_index(key).unwrap();
        rows.iter()
            .find(|r| r[n] == Value::from(name))
            .map(|r| r[k].clone())
            .unwrap()
    }

    struct Fixture {
        db: Database,
        group: i64,
        product: i64,
    }

    fn fixture() -> Result<Fixture> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let offer = db.table(&OFFERS).insert_empty(None).unwrap();
        let group = db.table(&GROUPS).insert_empty(Some(offer)).unwrap();
        let product = row(
            &db.table(&GROUP_PRODUCTS),
            Some(group),
            &[("name", Value::from("Base cabinet")), ("width", dec("600"))],
        );
        Ok(Fixture { db, group, product })
    }

    #[test]
    fn test_sibling_reference() -> Result<()> {
        let f = fixture()?;
        let parts = f.db.table(&GROUP_PARTS);
        row(&parts, Some(f.product), &[("name", Value::from("A")), ("width", dec("10"))]);
        row(
            &parts,
            Some(f.product),
            &[("name", Value::from("B")), ("code_width", Value::from("=\"A\".width * 2"))],
        );

        let rows = recompute(&parts, f.product).unwrap();
        assert_eq!(field(&GROUP_PARTS, &rows, "B", "width"), dec("20"));
        assert_eq!(field(&GROUP_PARTS, &rows, "A", "width"), dec("10"));
        Ok(())
    }

    #[test]
    fn test_computed_values_flow_forward() -> Result<()> {
        let f = fixture()?;
        let parts = f.db.table(&GROUP_PARTS);
        row(&parts, Some(f.product), &[("name", Value::from("A")), ("width", dec("10"))]);
        row(
            &parts,
            Some(f.product),
            &[
                ("name", Value::from("B")),
                ("code_width", Value::from("=\"A\".width * 2")),
                ("code_length", Value::from("=width * 2")),
            ],
        );
        row(
            &parts,
            Some(f.product),
            &[("name", Value::from("C")), ("code_width", Value::from("=\"B\".length + 1"))],
        );

        let rows = recompute(&parts, f.product).unwrap();
        assert_eq!(field(&GROUP_PARTS, &rows, "B", "length"), dec("40"));
        assert_eq!(field(&GROUP_PARTS, &rows, "C", "width"), dec("41"));
        Ok(())
    }

    #[test]
    fn test_joined_keywords() -> Result<()> {
        let f = fixture()?;
        row(
            &f.db.table(&GROUP_MATERIALS),
            Some(f.group),
            &[
                ("name", Value::from("oak")),
                ("thickness", dec("18")),
                ("cost", dec("10.00")),
                ("loss", dec("0.10")),
            ],
        );
        let parts = f.db.table(&GROUP_PARTS);
        row(
            &parts,
            Some(f.product),
            &[
                ("name", Value::from("Side")),
                ("material", Value::from("oak")),
                ("quantity", Value::Integer(2)),
                ("code_width", Value::from("=pwidth - 2 * mthickness")),
                ("code_cost", Value::from("=mcost * quantity")),
            ],
        );

        let rows = recompute(&parts, f.product).unwrap();
        assert_eq!(field(&GROUP_PARTS, &rows, "Side", "width"), dec("564"));
        assert_eq!(field(&GROUP_PARTS, &rows, "Side", "cost"), dec("22.00"));
        Ok(())
    }

    #[test]
    fn test_literals_and_failures_untouched() -> Result<()> {
        let f = fixture()?;
        let parts = f.db.table(&GROUP_PARTS);
        row(
            &parts,
            Some(f.product),
            &[
                ("name", Value::from("Shelf")),
                ("width", dec("5")),
                ("length", dec("7")),
                ("cost", dec("3")),
                ("code_width", Value::from("12")),
                ("code_length", Value::from("=depth * 2")),
                ("code_cost", Value::from("=1 / 0")),
            ],
        );
        row(
            &parts,
            Some(f.product),
            &[
                ("name", Value::from("Back")),
                ("length", dec("9")),
                ("code_width", Value::from("=\"Missing\".length")),
            ],
        );

        let rows = recompute(&parts, f.product).unwrap();
        assert_eq!(field(&GROUP_PARTS, &rows, "Shelf", "width"), dec("5"));
        assert_eq!(field(&GROUP_PARTS, &rows, "Shelf", "length"), dec("7"));
        assert_eq!(field(&GROUP_PARTS, &rows, "Shelf", "cost"), dec("3"));
        // Unknown row names fall back to the current row
        assert_eq!(field(&GROUP_PARTS, &rows, "Back", "width"), dec("9"));
        Ok(())
    }

    #[test]
    fn test_unchanged_rows_not_written() -> Result<()> {
        let f = fixture()?;
        let parts = f.db.table(&GROUP_PARTS);
        row(&parts, Some(f.product), &[("name", Value::from("A")), ("width", dec("10"))]);
        row(
            &parts,
            Some(f.product),
            &[("name", Value::from("B")), ("code_width", Value::from("=\"A\".width"))],
        );

        recompute(&parts, f.product).unwrap();
        let seq = max_seq(f.db.connection())?;
        let rows = recompute(&parts, f.product).unwrap();
        assert_eq!(max_seq(f.db.connection())?, seq);
        assert_eq!(field(&GROUP_PARTS, &rows, "B", "width"), dec("10"));
        Ok(())
    }

    #[test]
    fn test_catalogue_parts() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let product = row(&db.table(&PRODUCTS), None, &[("height", dec("720"))]);
        let parts = db.table(&PARTS);
        row(
            &parts,
            Some(product),
            &[("name", Value::from("Side")), ("code_length", Value::from("=pheight"))],
        );
        let rows = recompute(&parts, product).unwrap();
        assert_eq!(field(&PARTS, &rows, "Side", "length"), dec("720"));

        // Tables without the part columns are refused
        assert!(recompute(&db.table(&OFFERS), product).is_none());
        Ok(())
    }

    #[test]
    fn test_product_total_cost() -> Result<()> {
        let f = fixture()?;
        assert!(f.db.set_variable("work_cost_rate", Decimal::new(2500, 2)));
        let products = f.db.table(&GROUP_PRODUCTS);
        let work_time = GROUP_PRODUCTS.get_col_index("work_time")?;
        assert!(products.update(f.product, work_time, dec("1.0")));

        let parts = f.db.table(&GROUP_PARTS);
        for cost in ["1.50", "2.25", "0.80"] {
            row(&parts, Some(f.product), &[("cost", dec(cost))]);
        }

        let product = products.get(f.product).unwrap();
        assert_eq!(product[GROUP_PRODUCTS.get_col_index("parts_cost")?], dec("4.55"));
        assert_eq!(product[GROUP_PRODUCTS.get_col_index("tot_cost")?], dec("29.55"));
        Ok(())
    }
}
