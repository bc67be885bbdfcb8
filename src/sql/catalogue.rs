//! Catalogue pairing: one-time copies between an instance table and the
//! catalogue table holding reusable rows of the same shape.
//!
//! Copies are plain INSERT ... SELECT statements. No link survives the
//! copy; later edits on either side stay independent.

use rusqlite::{Connection, params_from_iter};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    sql::{engine::Table, schema::TableSchema, types::Value},
};

#[derive(Debug, Clone, Copy)]
enum Direction {
    ToCatalogue,
    FromCatalogue,
}

/// Pairs an instance table with its catalogue table
pub struct Catalogue<'a> {
    instance: Table<'a>,
    catalogue: Table<'a>,
    columns: Vec<&'static str>,
    child: Option<Box<Catalogue<'a>>>,
}

impl<'a> Catalogue<'a> {
    /// Both tables must share the same copyable columns
    pub fn new(instance: Table<'a>, catalogue: Table<'a>) -> Result<Self> {
        let columns = instance.schema().copy_columns();
        if columns != catalogue.schema().copy_columns() {
            return Err(Error::Internal(format!(
                "tables {} and {} do not share their columns",
                instance.name(),
                catalogue.name()
            )));
        }
        Ok(Self {
            instance,
            catalogue,
            columns,
            child: None,
        })
    }

    /// Copies the child rows along with each parent row. The child pairing
    /// must reference this pairing's tables through its foreign keys.
    pub fn with_children(mut self, child: Catalogue<'a>) -> Result<Self> {
        let references = |c: &TableSchema, p: &TableSchema| {
            c.foreign_key.is_some_and(|fk| fk.references == p.name)
        };
        if !references(child.instance.schema(), self.instance.schema())
            || !references(child.catalogue.schema(), self.catalogue.schema())
        {
            return Err(Error::Internal(format!(
                "{}/{} are not children of {}/{}",
                child.instance.name(),
                child.catalogue.name(),
                self.instance.name(),
                self.catalogue.name()
            )));
        }
        self.child = Some(Box::new(child));
        Ok(self)
    }

    /// Copies catalogue row `id` into the instance table under `scope`.
    /// Returns the new instance primary key.
    pub fn from_catalogue(&self, id: i64, scope: Option<i64>) -> Option<i64> {
        self.run(Direction::FromCatalogue, id, scope)
    }

    /// Copies instance row `id` into the catalogue. `scope` binds the
    /// catalogue's foreign key, `None` for scopeless catalogues.
    pub fn to_catalogue(&self, id: i64, scope: Option<i64>) -> Option<i64> {
        self.run(Direction::ToCatalogue, id, scope)
    }

    fn run(&self, direction: Direction, id: i64, scope: Option<i64>) -> Option<i64> {
        let conn = self.instance.connection();
        let result = conn.unchecked_transaction().map_err(Error::from).and_then(|tx| {
            let new_id = self.transfer(conn, direction, id, scope)?;
            tx.commit()?;
            Ok(new_id)
        });
        match result {
            Ok(new_id) => Some(new_id),
            Err(err) => {
                warn!(
                    instance = self.instance.name(),
                    catalogue = self.catalogue.name(),
                    ?direction,
                    id,
                    %err,
                    "catalogue copy failed"
                );
                None
            }
        }
    }

    fn tables(&self, direction: Direction) -> (&'static TableSchema, &'static TableSchema) {
        match direction {
            Direction::ToCatalogue => (self.instance.schema(), self.catalogue.schema()),
            Direction::FromCatalogue => (self.catalogue.schema(), self.instance.schema()),
        }
    }

    fn transfer(&self, conn: &Connection, direction: Direction, id: i64, scope: Option<i64>) -> Result<i64> {
        let (from, to) = self.tables(direction);
        let new_id = copy_row(conn, from, to, &self.columns, id, scope)?;
        if let Some(child) = &self.child {
            let (child_from, _) = child.tables(direction);
            for child_id in child_ids(conn, child_from, id)? {
                child.transfer(conn, direction, child_id, Some(new_id))?;
            }
        }
        Ok(new_id)
    }
}

fn copy_row(
    conn: &Connection,
    from: &TableSchema,
    to: &TableSchema,
    columns: &[&str],
    id: i64,
    scope: Option<i64>,
) -> Result<i64> {
    let mut targets = Vec::new();
    let mut sources = Vec::new();
    let mut params = Vec::new();
    if let Some(fk) = &to.foreign_key {
        targets.push(fk.column);
        sources.push("?");
        params.push(Value::from(scope));
    }
    targets.extend_from_slice(columns);
    sources.extend_from_slice(columns);
    params.push(Value::Integer(id));

    let sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} WHERE {} = ?",
        to.name,
        targets.join(", "),
        sources.join(", "),
        from.name,
        from.primary_key
    );
    debug!(%sql, id, ?scope, "catalogue copy");
    let count = conn.prepare_cached(&sql)?.execute(params_from_iter(params.iter()))?;
    if count == 0 {
        return Err(Error::Internal(format!("no row {} in {}", id, from.name)));
    }
    Ok(conn.last_insert_rowid())
}

fn child_ids(conn: &Connection, child: &TableSchema, parent: i64) -> Result<Vec<i64>> {
    let fk = child
        .foreign_key
        .as_ref()
        .ok_or_else(|| Error::Internal(format!("table {} has no foreign key", child.name)))?;
    let sql = format!(
        "SELECT {pk} FROM {table} WHERE {fk} = ? ORDER BY {pk}",
        pk = child.primary_key,
        table = child.name,
        fk = fk.column
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let ids = stmt
        .query_map([parent], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::Catalogue;
    use crate::{
        error::Result,
        quote::tables::{
            GROUP_MATERIALS, GROUP_PARTS, GROUP_PRODUCTS, GROUPS, MATERIALS, OFFERS, PARTS, PRODUCTS,
        },
        sql::{engine::Table, types::{Row, Value}},
        storage::Database,
    };

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    fn set(table: &Table<'_>, id: i64, fields: &[(&str, Value)]) {
        for (key, value) in fields {
            let idx = table.schema().get_col_index(key).unwrap();
            assert!(table.update(id, idx, value.clone()));
        }
    }

    /// Values of every column except the primary and foreign keys
    fn content(table: &Table<'_>, row: &Row) -> Vec<Value> {
        let schema = table.schema();
        let fk = schema.foreign_key_index();
        (0..row.len())
            .filter(|&i| schema.columns[i].key != schema.primary_key && Some(i) != fk)
            .map(|i| row[i].clone())
            .collect()
    }

    fn groups(db: &Database) -> (i64, i64) {
        let offer = db.table(&OFFERS).insert_empty(None).unwrap();
        let groups = db.table(&GROUPS);
        (
            groups.insert_empty(Some(offer)).unwrap(),
            groups.insert_empty(Some(offer)).unwrap(),
        )
    }

    #[test]
    fn test_material_round_trip() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let (a, b) = groups(&db);
        let instance = db.table(&GROUP_MATERIALS);
        let catalogue = db.table(&MATERIALS);
        let pairing = Catalogue::new(instance, catalogue)?;

        let id = instance.insert_empty(Some(a)).unwrap();
        set(
            &instance,
            id,
            &[
                ("name", Value::from("oak")),
                ("thickness", dec("18")),
                ("cost", dec("12.40")),
                ("loss", dec("0.15")),
                ("discount", dec("0.05")),
                ("info", Value::from("veneered")),
            ],
        );

        let cat_id = pairing.to_catalogue(id, None).unwrap();
        let copy_id = pairing.from_catalogue(cat_id, Some(b)).unwrap();

        let original = instance.get(id).unwrap();
        let copy = instance.get(copy_id).unwrap();
        assert_eq!(content(&instance, &copy), content(&instance, &original));
        assert_eq!(copy[GROUP_MATERIALS.get_col_index("group_id")?], Value::Integer(b));
        assert_eq!(content(&catalogue, &catalogue.get(cat_id).unwrap()), content(&instance, &original));

        // Independent rows
        set(&catalogue, cat_id, &[("cost", dec("99.00"))]);
        let cost = GROUP_MATERIALS.get_col_index("cost")?;
        assert_eq!(instance.get(copy_id).unwrap()[cost], dec("12.40"));
        Ok(())
    }

    #[test]
    fn test_failed_copy_is_atomic() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let (a, _) = groups(&db);
        let instance = db.table(&GROUP_MATERIALS);
        let catalogue = db.table(&MATERIALS);
        let pairing = Catalogue::new(instance, catalogue)?;

        let id = instance.insert_empty(Some(a)).unwrap();
        set(&instance, id, &[("name", Value::from("pine"))]);
        assert!(pairing.to_catalogue(id, None).is_some());
        // materials.name is unique
        assert!(pairing.to_catalogue(id, None).is_none());
        assert!(pairing.to_catalogue(9999, None).is_none());
        // Instance rows need a scope
        assert!(pairing.from_catalogue(1, None).is_none());
        assert_eq!(catalogue.count(None, None), Some(1));
        Ok(())
    }

    #[test]
    fn test_product_with_parts() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let (a, b) = groups(&db);
        let products = db.table(&GROUP_PRODUCTS);
        let parts = db.table(&GROUP_PARTS);
        let pairing = Catalogue::new(products, db.table(&PRODUCTS))?
            .with_children(Catalogue::new(parts, db.table(&PARTS))?)?;

        let product = products.insert_empty(Some(a)).unwrap();
        set(&products, product, &[("name", Value::from("Wall unit")), ("work_time", dec("2"))]);
        for (name, cost) in [("Side", "4.00"), ("Door", "9.50")] {
            let part = parts.insert_empty(Some(product)).unwrap();
            set(
                &parts,
                part,
                &[
                    ("name", Value::from(name)),
                    ("cost", dec(cost)),
                    ("code_width", Value::from("=pwidth")),
                ],
            );
        }

        let cat_id = pairing.to_catalogue(product, None).unwrap();
        let cat_parts = db.table(&PARTS);
        assert_eq!(cat_parts.count(Some(cat_id), None), Some(2));

        let copy = pairing.from_catalogue(cat_id, Some(b)).unwrap();
        let original_parts = parts.select(Some(product), None).unwrap();
        let copied_parts = parts.select(Some(copy), None).unwrap();
        assert_eq!(copied_parts.len(), 2);
        for (orig, copied) in original_parts.iter().zip(copied_parts.iter()) {
            assert_eq!(content(&parts, copied), content(&parts, orig));
        }
        let parts_cost = GROUP_PRODUCTS.get_col_index("parts_cost")?;
        assert_eq!(products.get(copy).unwrap()[parts_cost], dec("13.50"));
        Ok(())
    }

    #[test]
    fn test_failed_child_copy_rolls_back_parent() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.create_tables()?;
        let (a, _) = groups(&db);
        let products = db.table(&GROUP_PRODUCTS);
        let parts = db.table(&GROUP_PARTS);
        let cat_products = db.table(&PRODUCTS);
        let pairing = Catalogue::new(products, cat_products)?
            .with_children(Catalogue::new(parts, db.table(&PARTS))?)?;

        let product = products.insert_empty(Some(a)).unwrap();
        set(&products, product, &[("name", Value::from("Tall unit"))]);
        let part = parts.insert_empty(Some(product)).unwrap();
        set(&parts, part, &[("name", Value::from("Side"))]);

        // The product row copies, its parts cannot
        db.connection().execute_batch("DROP TABLE parts")?;
        assert!(pairing.to_catalogue(product, None).is_none());
        assert_eq!(cat_products.count(None, None), Some(0));
        assert_eq!(products.count(Some(a), None), Some(1));
        Ok(())
    }

    #[test]
    fn test_rejects_mismatched_tables() {
        let db = Database::open_in_memory().unwrap();
        assert!(Catalogue::new(db.table(&GROUP_MATERIALS), db.table(&PRODUCTS)).is_err());
        let pairing = Catalogue::new(db.table(&GROUP_MATERIALS), db.table(&MATERIALS)).unwrap();
        let parts = Catalogue::new(db.table(&GROUP_PARTS), db.table(&PARTS)).unwrap();
        assert!(pairing.with_children(parts).is_err());
    }
}
