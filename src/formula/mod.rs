//! Part formulas.
//!
//! A formula is a cell text starting with `=` followed by a small arithmetic
//! expression: decimal literals, `+ - * /`, unary minus, parentheses, field
//! keywords of the current row and `"<row name>".<keyword>` references to
//! sibling rows. Anything else in the cell is a literal and is not
//! evaluated.

use std::iter::Peekable;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};

pub mod ast;
mod lexer;

use ast::{Expression, Operator};
use lexer::{Lexer, Token};

/// First character of every formula
pub const MARKER: char = '=';

/// Fractional digits of an evaluated formula
pub const SCALE: u32 = 2;

/// A parsed formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expression,
}

impl Formula {
    /// Parses cell text. `Ok(None)` when the text is not a formula.
    pub fn parse(code: &str) -> Result<Option<Formula>> {
        let Some(body) = code.strip_prefix(MARKER) else {
            return Ok(None);
        };
        Ok(Some(Formula {
            expr: Parser::new(body).parse()?,
        }))
    }

    /// Evaluates with exact decimals and rounds half away from zero
    pub fn evaluate<F>(&self, resolve: &F) -> Result<Decimal>
    where
        F: Fn(Option<&str>, &str) -> Result<Decimal>,
    {
        let value = self.expr.evaluate(resolve)?;
        let mut rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(SCALE);
        Ok(rounded)
    }

    pub fn expression(&self) -> &Expression {
        &self.expr
    }
}

/// Recursive descent parser over the formula tokens
struct Parser<'a> {
    lexer: Peekable<Lexer<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input).peekable(),
        }
    }

    /// Parses the whole input, nothing may follow the expression
    fn parse(&mut self) -> Result<Expression> {
        let expr = self.parse_sum()?;
        if let Some(token) = self.peek()? {
            return Err(Error::Parse(format!("unexpected token {}", token)));
        }
        Ok(expr)
    }

    fn parse_sum(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_product()?;
        while let Some(op) = self.next_if_operator(|t| match t {
            Token::Plus => Some(Operator::Add),
            Token::Minus => Some(Operator::Sub),
            _ => None,
        })? {
            let rhs = self.parse_product()?;
            lhs = Expression::Operation(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_product(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_factor()?;
        while let Some(op) = self.next_if_operator(|t| match t {
            Token::Asterisk => Some(Operator::Mul),
            Token::Slash => Some(Operator::Div),
            _ => None,
        })? {
            let rhs = self.parse_factor()?;
            lhs = Expression::Operation(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expression> {
        Ok(match self.next()? {
            Token::Number(n) => Expression::Number(number(&n)?),
            Token::Ident(field) => Expression::Field(field),
            Token::Reference { row, field } => Expression::Reference { row, field },
            Token::Minus => Expression::Negate(Box::new(self.parse_factor()?)),
            Token::Plus => self.parse_factor()?,
            Token::OpenParen => {
                let expr = self.parse_sum()?;
                self.next_expect(Token::CloseParen)?;
                expr
            }
            token => return Err(Error::Parse(format!("unexpected token {}", token))),
        })
    }

    fn peek(&mut self) -> Result<Option<Token>> {
        match self.lexer.peek() {
            None => Ok(None),
            Some(Ok(token)) => Ok(Some(token.clone())),
            Some(Err(Error::Parse(msg))) => Err(Error::Parse(msg.clone())),
            Some(Err(err)) => Err(Error::Internal(err.to_string())),
        }
    }

    fn next(&mut self) -> Result<Token> {
        self.lexer
            .next()
            .unwrap_or_else(|| Err(Error::Parse("unexpected end of formula".into())))
    }

    fn next_expect(&mut self, expect: Token) -> Result<()> {
        let token = self.next()?;
        if token != expect {
            return Err(Error::Parse(format!("expected {}, got {}", expect, token)));
        }
        Ok(())
    }

    fn next_if_operator<F: Fn(&Token) -> Option<Operator>>(
        &mut self,
        predicate: F,
    ) -> Result<Option<Operator>> {
        let Some(op) = self.peek()?.as_ref().and_then(predicate) else {
            return Ok(None);
        };
        self.lexer.next();
        Ok(Some(op))
    }
}

/// Decodes a numeric literal, `.5` and `5.` included
fn number(text: &str) -> Result<Decimal> {
    let mut digits = text.to_string();
    if digits.starts_with('.') {
        digits.insert(0, '0');
    }
    if digits.ends_with('.') {
        digits.push('0');
    }
    Ok(Decimal::from_str(&digits)?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{
        Formula,
        ast::{Expression, Operator},
    };
    use crate::error::{Error, Result};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn eval(code: &str) -> Result<Decimal> {
        let formula = Formula::parse(code)?.ok_or(Error::Parse("not a formula".into()))?;
        formula.evaluate(&|row: Option<&str>, field: &str| match (row, field) {
            (None, "width") => Ok(dec("10")),
            (None, "length") => Ok(dec("2.5")),
            (Some("A"), "width") => Ok(dec("600")),
            _ => Err(Error::Eval(format!("unresolved name {}", field))),
        })
    }

    #[test]
    fn test_literals_are_not_formulas() -> Result<()> {
        assert_eq!(Formula::parse("")?, None);
        assert_eq!(Formula::parse("12.5")?, None);
        assert_eq!(Formula::parse("width * 2")?, None);
        // The marker must be the first character
        assert_eq!(Formula::parse("  =1")?, None);
        Ok(())
    }

    #[test]
    fn test_precedence() -> Result<()> {
        let formula = Formula::parse("=1 + 2 * 3")?.unwrap();
        assert_eq!(
            formula.expression(),
            &Expression::Operation(
                Box::new(Expression::Number(dec("1"))),
                Operator::Add,
                Box::new(Expression::Operation(
                    Box::new(Expression::Number(dec("2"))),
                    Operator::Mul,
                    Box::new(Expression::Number(dec("3"))),
                )),
            )
        );
        assert_eq!(eval("=1 + 2 * 3")?, dec("7.00"));
        assert_eq!(eval("=(1 + 2) * 3")?, dec("9"));
        assert_eq!(eval("=10 - 4 - 3")?, dec("3"));
        assert_eq!(eval("=-width + 1")?, dec("-9"));
        Ok(())
    }

    #[test]
    fn test_fields_and_references() -> Result<()> {
        assert_eq!(eval("=width * length")?, dec("25"));
        assert_eq!(eval("=\"A\".width * 2")?, dec("1200"));
        assert_eq!(eval("= (\"A\".width - 2*18) / 2")?, dec("282"));
        Ok(())
    }

    #[test]
    fn test_rounding() -> Result<()> {
        let value = eval("=10 / 3")?;
        assert_eq!(value.to_string(), "3.33");
        assert_eq!(eval("=0.125 * 1")?.to_string(), "0.13");
        assert_eq!(eval("=-0.125 * 1")?.to_string(), "-0.13");
        assert_eq!(eval("=2")?.to_string(), "2.00");
        Ok(())
    }

    #[test]
    fn test_errors() {
        assert!(matches!(eval("=width / 0"), Err(Error::Eval(_))));
        assert!(matches!(eval("=height * 2"), Err(Error::Eval(_))));
        assert!(matches!(eval("=\"B\".width"), Err(Error::Eval(_))));
        assert!(matches!(eval("=(1 + 2"), Err(Error::Parse(_))));
        assert!(matches!(eval("=1 2"), Err(Error::Parse(_))));
        assert!(matches!(eval("="), Err(Error::Parse(_))));
        assert!(matches!(eval("=1 +"), Err(Error::Parse(_))));
    }
}
