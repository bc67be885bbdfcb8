//! Formula lexer - splits formula text into tokens

use std::{fmt::Display, iter::Peekable, str::Chars};

use crate::error::{Error, Result};

/// A single lexical token of a formula
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Decimal literal
    Number(String),
    /// Field keyword of the current row
    Ident(String),
    /// `"<row name>".<keyword>`, a field of another row
    Reference { row: String, field: String },
    OpenParen,
    CloseParen,
    Plus,
    Minus,
    Asterisk,
    Slash,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => f.write_str(n),
            Token::Ident(ident) => f.write_str(ident),
            Token::Reference { row, field } => write!(f, "\"{}\".{}", row, field),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Asterisk => f.write_str("*"),
            Token::Slash => f.write_str("/"),
        }
    }
}

pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => self
                .iter
                .peek()
                .map(|c| Err(Error::Parse(format!("unexpected character {}", c)))),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            iter: text.chars().peekable(),
        }
    }

    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        self.iter.peek().filter(|&c| predicate(*c))?;
        self.iter.next()
    }

    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<String> {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c);
        }
        Some(value).filter(|v| !v.is_empty())
    }

    fn scan(&mut self) -> Result<Option<Token>> {
        self.next_while(char::is_whitespace);
        match self.iter.peek() {
            Some('"') => self.scan_reference().map(Some),
            Some(c) if c.is_ascii_digit() || *c == '.' => self.scan_number().map(Some),
            Some(c) if c.is_alphabetic() => Ok(self.scan_ident().map(Token::Ident)),
            Some(_) => Ok(self.scan_symbol()),
            None => Ok(None),
        }
    }

    /// Scans `"name".keyword`. The row name is taken verbatim.
    fn scan_reference(&mut self) -> Result<Token> {
        self.iter.next();
        let mut row = String::new();
        loop {
            match self.iter.next() {
                Some('"') => break,
                Some(c) => row.push(c),
                None => return Err(Error::Parse("unterminated row name".into())),
            }
        }
        if self.next_if(|c| c == '.').is_none() {
            return Err(Error::Parse(format!("expected . after \"{}\"", row)));
        }
        let field = self
            .scan_ident()
            .ok_or(Error::Parse(format!("expected field name after \"{}\".", row)))?;
        Ok(Token::Reference { row, field })
    }

    fn scan_number(&mut self) -> Result<Token> {
        let mut val = self.next_while(|c| c.is_ascii_digit()).unwrap_or_default();
        if let Some(sep) = self.next_if(|c| c == '.') {
            val.push(sep);
            while let Some(c) = self.next_if(|c| c.is_ascii_digit()) {
                val.push(c);
            }
        }
        if val == "." {
            return Err(Error::Parse("lone decimal point".into()));
        }
        Ok(Token::Number(val))
    }

    fn scan_ident(&mut self) -> Option<String> {
        let mut val = self.next_if(|c| c.is_alphabetic())?.to_string();
        while let Some(c) = self.next_if(|c| c.is_alphanumeric() || c == '_') {
            val.push(c);
        }
        Some(val.to_lowercase())
    }

    fn scan_symbol(&mut self) -> Option<Token> {
        let token = match self.iter.peek()? {
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Asterisk,
            '/' => Token::Slash,
            _ => return None,
        };
        self.iter.next();
        Some(token)
    }
}
