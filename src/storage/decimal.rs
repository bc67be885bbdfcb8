//! Exact-decimal bridge into SQLite.
//!
//! SQLite has no decimal type, so decimals are stored as canonical ASCII
//! text and every arithmetic step done inside a query goes through the
//! functions registered here. Each function takes the storage encoding and
//! returns the storage encoding, so calls compose without ever passing
//! through binary floating point.

use std::str::FromStr;

use rusqlite::Connection;
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::error::Result;

/// Minimum number of fractional digits in the storage encoding.
pub const SCALE: u32 = 2;

/// `0.00`, what absent or undecodable input reads as.
pub fn zero() -> Decimal {
    Decimal::new(0, SCALE)
}

/// Encodes a decimal for storage: positional notation, no exponent, at
/// least two fractional digits. `None` encodes as `"0.00"`.
pub fn to_storage(value: Option<&Decimal>) -> String {
    let mut value = value.copied().unwrap_or_else(zero);
    if value.scale() < SCALE {
        value.rescale(SCALE);
    }
    value.to_string()
}

/// Decodes the storage encoding. Never fails: absent or undecodable input
/// yields `0.00`.
pub fn from_storage(raw: Option<&[u8]>) -> Decimal {
    raw.and_then(|bytes| std::str::from_utf8(bytes).ok())
        .map(str::trim)
        .and_then(|text| {
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .ok()
        })
        .unwrap_or_else(zero)
}

/// Decodes whatever SQLite hands to a function argument.
pub fn from_value_ref(raw: ValueRef<'_>) -> Decimal {
    match raw {
        ValueRef::Null => zero(),
        ValueRef::Integer(i) => Decimal::from(i),
        ValueRef::Real(f) => Decimal::from_f64(f).unwrap_or_else(zero),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => from_storage(Some(bytes)),
    }
}

/// `(cost * (1 + loss) + add_cost + edge_cost) * (1 - discount)`
pub fn material_unit_cost(
    cost: Decimal,
    add_cost: Decimal,
    edge_cost: Decimal,
    loss: Decimal,
    discount: Decimal,
) -> Option<Decimal> {
    cost.checked_mul(Decimal::ONE.checked_add(loss)?)?
        .checked_add(add_cost)?
        .checked_add(edge_cost)?
        .checked_mul(Decimal::ONE.checked_sub(discount)?)
}

/// `parts_cost_sum + work_time * work_cost_rate`
pub fn product_total_cost(
    parts_cost_sum: Decimal,
    work_time: Decimal,
    work_cost_rate: Decimal,
) -> Option<Decimal> {
    parts_cost_sum.checked_add(work_time.checked_mul(work_cost_rate)?)
}

fn arg(ctx: &Context<'_>, idx: usize) -> Decimal {
    from_value_ref(ctx.get_raw(idx))
}

/// Storage encoding of a result, SQL NULL when the arithmetic overflowed or
/// divided by zero.
fn encode(value: Option<Decimal>) -> Option<String> {
    value.map(|v| to_storage(Some(&v)))
}

/// Streaming `dec_sum` aggregate.
struct DecimalSum;

impl Aggregate<Decimal, String> for DecimalSum {
    fn init(&self, _: &mut Context<'_>) -> rusqlite::Result<Decimal> {
        Ok(zero())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut Decimal) -> rusqlite::Result<()> {
        *acc = acc
            .checked_add(arg(ctx, 0))
            .ok_or_else(|| rusqlite::Error::UserFunctionError("dec_sum overflow".into()))?;
        Ok(())
    }

    fn finalize(&self, _: &mut Context<'_>, acc: Option<Decimal>) -> rusqlite::Result<String> {
        Ok(to_storage(acc.as_ref()))
    }
}

/// Registers every decimal function on the connection. Must run before any
/// table with a generated decimal column is touched.
pub fn register(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8
        | FunctionFlags::SQLITE_DETERMINISTIC
        | FunctionFlags::SQLITE_INNOCUOUS;

    conn.create_scalar_function("dec_add", -1, flags, |ctx| {
        let mut total = Some(zero());
        for i in 0..ctx.len() {
            total = total.and_then(|t| t.checked_add(arg(ctx, i)));
        }
        Ok(encode(total))
    })?;
    conn.create_scalar_function("dec_sub", 2, flags, |ctx| {
        Ok(encode(arg(ctx, 0).checked_sub(arg(ctx, 1))))
    })?;
    conn.create_scalar_function("dec_mul", 2, flags, |ctx| {
        Ok(encode(arg(ctx, 0).checked_mul(arg(ctx, 1))))
    })?;
    conn.create_scalar_function("dec_div", 2, flags, |ctx| {
        Ok(encode(arg(ctx, 0).checked_div(arg(ctx, 1))))
    })?;
    conn.create_scalar_function("dec_cmp", 2, flags, |ctx| {
        Ok(arg(ctx, 0).cmp(&arg(ctx, 1)) as i64)
    })?;
    conn.create_aggregate_function("dec_sum", 1, flags, DecimalSum)?;

    conn.create_scalar_function("dec_material_unit_cost", 5, flags, |ctx| {
        Ok(encode(material_unit_cost(
            arg(ctx, 0),
            arg(ctx, 1),
            arg(ctx, 2),
            arg(ctx, 3),
            arg(ctx, 4),
        )))
    })?;
    conn.create_scalar_function("dec_product_total_cost", 3, flags, |ctx| {
        Ok(encode(product_total_cost(arg(ctx, 0), arg(ctx, 1), arg(ctx, 2))))
    })?;
    Ok(())
}
