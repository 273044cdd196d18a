//! Formula algebra
//!
//! A conversion formula is a single equation `<output> = <expression>` whose
//! right-hand side references exactly one unit symbol. This module parses
//! such formulas, evaluates them at a numeric input and solves them for
//! their input symbol.
//!
//! # Example
//!
//! ```
//! use unitforge::core::formula::{evaluate_formula, invert_formula};
//!
//! let value = evaluate_formula("centimeters = meters * 100", "meters", 2.5).unwrap();
//! assert_eq!(value, 250.0);
//!
//! let inverse = invert_formula("centimeters = meters * 100").unwrap();
//! assert_eq!(inverse, "meters = centimeters / 100");
//! ```

pub mod evaluator;
pub mod parser;
pub mod solver;
pub mod tokenizer;

pub use evaluator::{evaluate, EvalContext, EvalError};
pub use parser::{parse, BinOp, Expr, ParseError};
pub use tokenizer::{tokenize, Token, TokenizeError};

use crate::types::{normalize_unit_name, UnitPair};
use std::fmt;
use thiserror::Error;

/// Failures of the formula algebra
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Malformed formula text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Wrong number of free variables
    #[error("Formula shape error: {0}")]
    Shape(String),

    /// A formula/input pair does not reduce to a real number
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// No unique closed-form inverse
    #[error("Uninvertible formula: {0}")]
    Uninvertible(String),
}

impl From<TokenizeError> for FormulaError {
    fn from(err: TokenizeError) -> Self {
        FormulaError::Parse(err.to_string())
    }
}

impl From<ParseError> for FormulaError {
    fn from(err: ParseError) -> Self {
        FormulaError::Parse(err.to_string())
    }
}

impl From<EvalError> for FormulaError {
    fn from(err: EvalError) -> Self {
        FormulaError::Evaluation(err.message)
    }
}

/// An equation split into its named output and parsed right-hand side.
///
/// No constraint on the number of free variables; see [`Formula`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    pub output: String,
    pub expression: Expr,
}

/// Split `text` on its single `=` and parse both sides
pub fn parse_formula(text: &str) -> Result<ParsedFormula, FormulaError> {
    let mut sides = text.split('=');
    let (lhs, rhs) = match (sides.next(), sides.next(), sides.next()) {
        (Some(lhs), Some(rhs), None) => (lhs, rhs),
        _ => {
            return Err(FormulaError::Parse(format!(
                "expected exactly one '=' in '{}'",
                text.trim()
            )))
        }
    };

    let output = match tokenize(lhs)?.as_slice() {
        [Token::Identifier(_)] => normalize_unit_name(lhs),
        _ => {
            return Err(FormulaError::Parse(format!(
                "left-hand side '{}' must be a single unit symbol",
                lhs.trim()
            )))
        }
    };

    if rhs.trim().is_empty() {
        return Err(FormulaError::Parse(format!(
            "right-hand side of '{}' is empty",
            text.trim()
        )));
    }

    let expression = parse(tokenize(rhs)?)?;
    Ok(ParsedFormula { output, expression })
}

/// A conversion formula with exactly one input symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    output: String,
    input: String,
    expression: Expr,
}

impl Formula {
    /// Parse and enforce the single-free-variable shape
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let ParsedFormula { output, expression } = parse_formula(text)?;
        let free = expression.free_variables();

        if free.len() != 1 {
            let found = if free.is_empty() {
                "none".to_string()
            } else {
                free.iter().cloned().collect::<Vec<_>>().join(", ")
            };
            return Err(FormulaError::Shape(format!(
                "'{}' must reference exactly one input symbol, found {}",
                text.trim(),
                found
            )));
        }

        let input = free.into_iter().next().unwrap_or_default();
        Ok(Self {
            output,
            input,
            expression,
        })
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Whether this formula computes `pair.to_unit` from `pair.from_unit`
    pub fn converts(&self, pair: &UnitPair) -> bool {
        self.output == pair.to_unit() && self.input == pair.from_unit()
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Substitute `value` for the input symbol and reduce
    pub fn evaluate(&self, value: f64) -> Result<f64, FormulaError> {
        let ctx = EvalContext::with_variable(self.input.clone(), value);
        Ok(evaluate(&self.expression, &ctx)?)
    }

    /// Solve for the input symbol, giving `input = f⁻¹(output)`
    pub fn invert(&self) -> Result<Formula, FormulaError> {
        let solved = solver::solve_for(
            &self.expression,
            &self.input,
            Expr::variable(self.output.clone()),
        )?;
        Ok(Formula {
            output: self.input.clone(),
            input: self.output.clone(),
            expression: solved,
        })
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.output, self.expression)
    }
}

/// Evaluate `text` with its input symbol bound to `value`.
///
/// `input_name` is normalized like a unit name and must match the formula's
/// only free variable.
pub fn evaluate_formula(text: &str, input_name: &str, value: f64) -> Result<f64, FormulaError> {
    let formula = Formula::parse(text)?;
    let name = normalize_unit_name(input_name);
    if name != formula.input() {
        return Err(FormulaError::Evaluation(format!(
            "'{}' is not the input of '{}' (expected '{}')",
            name,
            text.trim(),
            formula.input()
        )));
    }
    formula.evaluate(value)
}

/// Invert `text`, returning the new formula as a string
pub fn invert_formula(text: &str) -> Result<String, FormulaError> {
    Ok(Formula::parse(text)?.invert()?.to_string())
}
