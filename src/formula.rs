//! Named cost formulas over per-row components.
//!
//! Expressions are parsed by a small recursive-descent parser into an [`Expr`]
//! tree and evaluated against a fixed map of component bindings. Nothing
//! outside that map is reachable: there are no functions, no attribute access
//! and no host-language evaluation.
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | NUMBER | IDENT | '(' expr ')'
//! ```

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    components::{COMPONENTS, find_column_by_candidates},
    data::Value,
    ingest::{self, ReadOptions},
    table::Table,
};

pub const DEFAULT_FORMULA_NAME: &str = "PROCESS_COST";
pub const DEFAULT_FORMULA_EXPRESSION: &str = "AMOR + DIS + EDIS + ENER + GUG";

const NAME_CANDIDATES: &[&str] = &["name", "formul ad", "formül adı", "kod"];
const EXPRESSION_CANDIDATES: &[&str] = &["expr", "formul", "formül", "expression"];

#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("character '{0}' is not allowed in formulas")]
    UnsafeCharacter(char),
    #[error("unexpected '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("expression ended unexpectedly")]
    UnexpectedEnd,
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Variable(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, bindings: &HashMap<&str, f64>) -> Result<f64, FormulaError> {
        match self {
            Expr::Literal(value) => Ok(*value),
            Expr::Variable(name) => bindings
                .get(name.as_str())
                .copied()
                .ok_or_else(|| FormulaError::UnknownName(name.clone())),
            Expr::Unary(op, inner) => {
                let value = inner.eval(bindings)?;
                Ok(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Minus => -value,
                })
            }
            Expr::Binary(op, left, right) => {
                let left = left.eval(bindings)?;
                let right = right.eval(bindings)?;
                match op {
                    BinaryOp::Add => Ok(left + right),
                    BinaryOp::Sub => Ok(left - right),
                    BinaryOp::Mul => Ok(left * right),
                    BinaryOp::Div if right == 0.0 => Err(FormulaError::DivisionByZero),
                    BinaryOp::Div => Ok(left / right),
                }
            }
        }
    }
}

/// True when `expression` only uses ASCII letters, digits, whitespace,
/// underscore and the four arithmetic operators.
pub fn is_safe_expression(expression: &str) -> bool {
    first_unsafe_char(expression).is_none()
}

fn first_unsafe_char(expression: &str) -> Option<char> {
    expression.chars().find(|ch| {
        !(ch.is_ascii_alphanumeric()
            || ch.is_whitespace()
            || matches!(ch, '_' | '+' | '-' | '*' | '/'))
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Ident(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let chars = source.char_indices().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut idx = 0;
    while idx < chars.len() {
        let (position, ch) = chars[idx];
        if ch.is_whitespace() {
            idx += 1;
            continue;
        }
        let take_while = |start: usize, pred: fn(char) -> bool| {
            let mut end = start;
            while end < chars.len() && pred(chars[end].1) {
                end += 1;
            }
            (end, chars[start..end].iter().map(|(_, c)| *c).collect::<String>())
        };
        let token = match ch {
            '0'..='9' | '.' => {
                let (end, text) = take_while(idx, |c| c.is_ascii_digit() || c == '.');
                idx = end;
                Token::Number(text)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let (end, text) = take_while(idx, |c| c.is_ascii_alphanumeric() || c == '_');
                idx = end;
                Token::Ident(text)
            }
            '+' | '-' | '*' | '/' => {
                idx += 1;
                Token::Op(ch)
            }
            '(' => {
                idx += 1;
                Token::Open
            }
            ')' => {
                idx += 1;
                Token::Close
            }
            other => return Err(FormulaError::UnsafeCharacter(other)),
        };
        tokens.push((position, token));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, token)| token)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let item = self.tokens.get(self.cursor).cloned();
        self.cursor += 1;
        item
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = if *op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            self.cursor += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = if *op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            self.cursor += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, FormulaError> {
        let Some((position, token)) = self.next() else {
            return Err(FormulaError::UnexpectedEnd);
        };
        match token {
            Token::Op('+') => Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.factor()?))),
            Token::Op('-') => Ok(Expr::Unary(UnaryOp::Minus, Box::new(self.factor()?))),
            Token::Number(text) => text
                .parse::<f64>()
                .map(Expr::Literal)
                .map_err(|_| FormulaError::InvalidNumber(text)),
            Token::Ident(name) => Ok(Expr::Variable(name)),
            Token::Open => {
                let inner = self.expr()?;
                match self.next() {
                    Some((_, Token::Close)) => Ok(inner),
                    Some((position, token)) => Err(unexpected(position, &token)),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            other => Err(unexpected(position, &other)),
        }
    }
}

fn unexpected(position: usize, token: &Token) -> FormulaError {
    let found = match token {
        Token::Number(text) | Token::Ident(text) => text.clone(),
        Token::Op(op) => op.to_string(),
        Token::Open => "(".to_string(),
        Token::Close => ")".to_string(),
    };
    FormulaError::UnexpectedToken { found, position }
}

/// Parses an arithmetic expression. Accepts parentheses; callers that must
/// honour the formula character policy check [`is_safe_expression`] first.
pub fn parse_expression(source: &str) -> Result<Expr, FormulaError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        cursor: 0,
    };
    let expr = parser.expr()?;
    match parser.next() {
        None => Ok(expr),
        Some((position, token)) => Err(unexpected(position, &token)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub expression: String,
}

/// Ordered formula definitions; evaluation follows insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaSet {
    formulas: Vec<Formula>,
}

impl Default for FormulaSet {
    fn default() -> Self {
        let mut set = FormulaSet::empty();
        set.insert(DEFAULT_FORMULA_NAME, DEFAULT_FORMULA_EXPRESSION);
        set
    }
}

impl FormulaSet {
    pub fn empty() -> Self {
        Self {
            formulas: Vec::new(),
        }
    }

    /// Adds a formula; an existing name keeps its position and takes the new
    /// expression.
    pub fn insert(&mut self, name: &str, expression: &str) {
        match self.formulas.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.expression = expression.to_string(),
            None => self.formulas.push(Formula {
                name: name.to_string(),
                expression: expression.to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.formulas.iter()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Reads formulas from a `{name, expression}` table. Unresolvable columns
    /// or a table without usable rows yield an empty set.
    pub fn from_table(table: &Table) -> Self {
        let mut set = FormulaSet::empty();
        let columns = table.columns();
        let (Some(name_column), Some(expr_column)) = (
            find_column_by_candidates(columns, NAME_CANDIDATES),
            find_column_by_candidates(columns, EXPRESSION_CANDIDATES),
        ) else {
            return set;
        };
        for row in 0..table.len() {
            let cell = |column: &str| {
                table
                    .get(row, column)
                    .map(|v| v.as_display().trim().to_string())
                    .unwrap_or_default()
            };
            let (name, expression) = (cell(&name_column), cell(&expr_column));
            if !name.is_empty() && !expression.is_empty() {
                set.insert(&name, &expression);
            }
        }
        set
    }

    pub fn load(path: &Path) -> Result<Self> {
        let table = ingest::read_file(path, &ReadOptions::default())
            .with_context(|| format!("Reading formula source {path:?}"))?;
        Ok(Self::from_table(&table))
    }

    /// Formula source with fallback: any failure or an empty result gives the
    /// built-in set.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(set) if !set.is_empty() => {
                debug!("Loaded {} formula(s) from {path:?}", set.len());
                set
            }
            Ok(_) => {
                warn!("Formula source {path:?} has no usable formulas; using defaults");
                FormulaSet::default()
            }
            Err(err) => {
                warn!("{err:#}; using default formulas");
                FormulaSet::default()
            }
        }
    }
}

fn evaluate_rows(table: &Table, expr: &Expr) -> Result<Vec<Value>, FormulaError> {
    let positions = COMPONENTS
        .iter()
        .map(|component| (*component, table.column_index(component)))
        .collect::<Vec<_>>();
    table
        .rows()
        .iter()
        .map(|row| {
            let bindings = positions
                .iter()
                .map(|(name, idx)| (*name, idx.map(|i| row[i].to_float()).unwrap_or(0.0)))
                .collect::<HashMap<_, _>>();
            expr.eval(&bindings).map(Value::Number)
        })
        .collect()
}

/// Adds one column per formula that validates, parses and evaluates on every
/// row. Failing formulas are skipped without touching the table.
pub fn evaluate(components: &Table, formulas: &FormulaSet) -> Table {
    let mut out = components.clone();
    for formula in formulas.iter() {
        if let Some(ch) = first_unsafe_char(&formula.expression) {
            debug!(
                "Skipping formula '{}': {}",
                formula.name,
                FormulaError::UnsafeCharacter(ch)
            );
            continue;
        }
        let outcome = parse_expression(&formula.expression)
            .and_then(|expr| evaluate_rows(&out, &expr));
        match outcome {
            Ok(values) => out.set_column(&formula.name, values),
            Err(err) => debug!("Skipping formula '{}': {err}", formula.name),
        }
    }
    out
}
