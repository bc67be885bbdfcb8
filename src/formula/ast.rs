use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

/// Formula expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(Decimal),
    /// Field of the current row
    Field(String),
    /// Field of the row named `row`
    Reference { row: String, field: String },
    Negate(Box<Expression>),
    Operation(Box<Expression>, Operator, Box<Expression>),
}

impl Expression {
    /// Evaluates the tree. `resolve(row, field)` supplies field values, with
    /// `row` set for cross references.
    pub fn evaluate<F>(&self, resolve: &F) -> Result<Decimal>
    where
        F: Fn(Option<&str>, &str) -> Result<Decimal>,
    {
        match self {
            Expression::Number(n) => Ok(*n),
            Expression::Field(field) => resolve(None, field.as_str()),
            Expression::Reference { row, field } => resolve(Some(row.as_str()), field.as_str()),
            Expression::Negate(expr) => Ok(-expr.evaluate(resolve)?),
            Expression::Operation(lhs, op, rhs) => {
                let (l, r) = (lhs.evaluate(resolve)?, rhs.evaluate(resolve)?);
                let result = match op {
                    Operator::Add => l.checked_add(r),
                    Operator::Sub => l.checked_sub(r),
                    Operator::Mul => l.checked_mul(r),
                    Operator::Div if r.is_zero() => {
                        return Err(Error::Eval("division by zero".into()));
                    }
                    Operator::Div => l.checked_div(r),
                };
                result.ok_or(Error::Eval(format!("overflow in {} {:?} {}", l, op, r)))
            }
        }
    }
}
