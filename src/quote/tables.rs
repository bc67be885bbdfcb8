//! Table descriptors of the quoting domain.
//!
//! Instance tables hang off an offer (`offers` > `groups` > everything
//! else); catalogue tables (`materials`, `products`, `parts`) are shared by
//! all offers. Each instance/catalogue pair has the same copyable columns.

use crate::sql::{
    schema::{Column, ForeignKey, TableSchema},
    types::DataType,
};

const fn id() -> Column {
    Column::new("id", "ID", DataType::Integer).read_only()
}

const fn parent(key: &'static str, label: &'static str) -> Column {
    Column::new(key, label, DataType::Integer).read_only()
}

const fn cascade(column: &'static str, references: &'static str) -> Option<ForeignKey> {
    Some(ForeignKey { column, references })
}

pub static OFFERS: TableSchema = TableSchema {
    name: "offers",
    alias: "o",
    primary_key: "id",
    foreign_key: None,
    unique: &[],
    columns: &[
        id(),
        Column::new("name", "Name", DataType::String),
        Column::new("client", "Client", DataType::String),
        Column::new("address", "Address", DataType::String),
        Column::new("date", "Date", DataType::String),
        Column::new("info", "Info", DataType::String),
    ],
    joins: "",
};

pub static GROUPS: TableSchema = TableSchema {
    name: "groups",
    alias: "g",
    primary_key: "id",
    foreign_key: cascade("offer_id", "offers"),
    unique: &["offer_id", "name"],
    columns: &[
        id(),
        parent("offer_id", "Offer"),
        Column::new("name", "Name", DataType::String),
        Column::new("info", "Info", DataType::String),
    ],
    joins: "",
};

/// Default material per part name inside a group
pub static PREDEFS: TableSchema = TableSchema {
    name: "predefs",
    alias: "d",
    primary_key: "id",
    foreign_key: cascade("group_id", "groups"),
    unique: &["group_id", "partname"],
    columns: &[
        id(),
        parent("group_id", "Group"),
        Column::new("partname", "Part", DataType::String),
        Column::new("material", "Material", DataType::String),
        Column::new("info", "Info", DataType::String),
    ],
    joins: "",
};

const MATERIAL_UNIT_COST: &str = "dec_material_unit_cost(cost, add_cost, edge_cost, loss, discount)";

macro_rules! material_columns {
    ($($scope:expr)?) => {
        &[
            id(),
            $($scope,)?
            Column::new("name", "Name", DataType::String),
            Column::new("thickness", "Thickness", DataType::Decimal),
            Column::new("cost", "Cost", DataType::Decimal),
            Column::new("add_cost", "Added cost", DataType::Decimal),
            Column::new("edge_cost", "Edge cost", DataType::Decimal),
            Column::new("loss", "Loss", DataType::Decimal),
            Column::new("discount", "Discount", DataType::Decimal),
            Column::new("info", "Info", DataType::String),
            Column::new("tot_cost", "Unit cost", DataType::Decimal).generated(MATERIAL_UNIT_COST),
        ]
    };
}

pub static GROUP_MATERIALS: TableSchema = TableSchema {
    name: "group_materials",
    alias: "t",
    primary_key: "id",
    foreign_key: cascade("group_id", "groups"),
    unique: &["group_id", "name"],
    columns: material_columns!(parent("group_id", "Group")),
    joins: "",
};

pub static MATERIALS: TableSchema = TableSchema {
    name: "materials",
    alias: "t",
    primary_key: "id",
    foreign_key: None,
    unique: &["name"],
    columns: material_columns!(),
    joins: "",
};

macro_rules! product_columns {
    ($parts_cost:literal; $($scope:expr)?) => {
        &[
            id(),
            $($scope,)?
            Column::new("name", "Name", DataType::String),
            Column::new("quantity", "Quantity", DataType::Integer).with_default("1"),
            Column::new("width", "Width", DataType::Decimal),
            Column::new("height", "Height", DataType::Decimal),
            Column::new("depth", "Depth", DataType::Decimal),
            Column::new("work_time", "Work time", DataType::Decimal),
            Column::new("info", "Info", DataType::String),
            Column::new("parts_cost", "Parts cost", DataType::Decimal).computed($parts_cost),
            Column::new("tot_cost", "Total cost", DataType::Decimal).computed(concat!(
                "dec_product_total_cost(",
                $parts_cost,
                ", t.work_time, ",
                "(SELECT v.value FROM variables v WHERE v.name = 'work_cost_rate')",
                ")"
            )),
        ]
    };
}

pub static GROUP_PRODUCTS: TableSchema = TableSchema {
    name: "group_products",
    alias: "t",
    primary_key: "id",
    foreign_key: cascade("group_id", "groups"),
    unique: &[],
    columns: product_columns!(
        "(SELECT dec_sum(p.cost) FROM group_parts p WHERE p.product_id = t.id)";
        parent("group_id", "Group")
    ),
    joins: "",
};

pub static PRODUCTS: TableSchema = TableSchema {
    name: "products",
    alias: "t",
    primary_key: "id",
    foreign_key: None,
    unique: &[],
    columns: product_columns!(
        "(SELECT dec_sum(p.cost) FROM parts p WHERE p.product_id = t.id)";
    ),
    joins: "",
};

macro_rules! part_columns {
    () => {
        &[
            id(),
            parent("product_id", "Product"),
            Column::new("name", "Name", DataType::String),
            Column::new("material", "Material", DataType::String),
            Column::new("quantity", "Quantity", DataType::Integer).with_default("1"),
            Column::new("width", "Width", DataType::Decimal),
            Column::new("length", "Length", DataType::Decimal),
            Column::new("cost", "Cost", DataType::Decimal),
            Column::new("code_width", "Width formula", DataType::String),
            Column::new("code_length", "Length formula", DataType::String),
            Column::new("code_cost", "Cost formula", DataType::String),
            Column::new("info", "Info", DataType::String),
            Column::new("mthickness", "Material thickness", DataType::Decimal).computed("m.thickness"),
            Column::new("mcost", "Material cost", DataType::Decimal).computed("m.tot_cost"),
            Column::new("pwidth", "Product width", DataType::Decimal).computed("pr.width"),
            Column::new("pheight", "Product height", DataType::Decimal).computed("pr.height"),
            Column::new("pdepth", "Product depth", DataType::Decimal).computed("pr.depth"),
        ]
    };
}

/// Parts of offer products. Materials are looked up by name inside the
/// product's own group.
pub static GROUP_PARTS: TableSchema = TableSchema {
    name: "group_parts",
    alias: "t",
    primary_key: "id",
    foreign_key: cascade("product_id", "group_products"),
    unique: &[],
    columns: part_columns!(),
    joins: "LEFT JOIN group_products pr ON pr.id = t.product_id \
            LEFT JOIN group_materials m ON m.group_id = pr.group_id AND m.name = t.material",
};

/// Parts of catalogue products, materials come from the catalogue
pub static PARTS: TableSchema = TableSchema {
    name: "parts",
    alias: "t",
    primary_key: "id",
    foreign_key: cascade("product_id", "products"),
    unique: &[],
    columns: part_columns!(),
    joins: "LEFT JOIN products pr ON pr.id = t.product_id \
            LEFT JOIN materials m ON m.name = t.material",
};

/// Every domain table, parents before children
pub static ALL: &[&TableSchema] = &[
    &OFFERS,
    &GROUPS,
    &PREDEFS,
    &MATERIALS,
    &GROUP_MATERIALS,
    &PRODUCTS,
    &PARTS,
    &GROUP_PRODUCTS,
    &GROUP_PARTS,
];

#[cfg(test)]
mod tests {
    use super::ALL;
    use crate::error::Result;

    #[test]
    fn test_schemas_valid() -> Result<()> {
        for schema in ALL {
            schema.validate()?;
        }
        Ok(())
    }
}
