//! Formula evaluator
//!
//! Reduces an expression tree to a real number given bindings for its
//! variables. Anything that does not reduce to a finite real (division by
//! zero, even roots of negatives, overflow) is an error.

use super::parser::{BinOp, Expr};
use std::collections::HashMap;

/// Variable bindings for evaluation
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub variables: HashMap<String, f64>,
}

impl EvalContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context binding a single variable
    pub fn with_variable(name: impl Into<String>, value: f64) -> Self {
        let mut ctx = Self::new();
        ctx.set(name, value);
        ctx
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eval error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate an expression in the given context
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<f64, EvalError> {
    let value = match expr {
        Expr::Number(n) => *n,

        Expr::Variable(name) => ctx
            .get(name)
            .ok_or_else(|| EvalError::new(format!("Unknown variable: {}", name)))?,

        Expr::Negate(operand) => -evaluate(operand, ctx)?,

        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            evaluate_binary_op(*op, l, r)?
        }

        Expr::Power { base, exponent } => {
            let b = evaluate(base, ctx)?;
            let e = evaluate(exponent, ctx)?;
            if b == 0.0 && e < 0.0 {
                return Err(EvalError::new("Division by zero"));
            }
            odd_root(b, e).unwrap_or_else(|| b.powf(e))
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::new(format!(
            "'{}' does not reduce to a real number",
            expr
        )))
    }
}

/// Real root of a negative base, `b ** (1 / n)` for odd `n`
fn odd_root(b: f64, e: f64) -> Option<f64> {
    if b >= 0.0 || e == 0.0 || e.fract() == 0.0 {
        return None;
    }
    let n = 1.0 / e;
    let rounded = n.round();
    if (n - rounded).abs() > 1e-9 * rounded.abs() || rounded % 2.0 == 0.0 {
        return None;
    }
    Some(-(-b).powf(e))
}

/// Evaluate a binary operation
fn evaluate_binary_op(op: BinOp, l: f64, r: f64) -> Result<f64, EvalError> {
    match op {
        BinOp::Add => Ok(l + r),
        BinOp::Sub => Ok(l - r),
        BinOp::Mul => Ok(l * r),
        BinOp::Div => {
            if r == 0.0 {
                Err(EvalError::new("Division by zero"))
            } else {
                Ok(l / r)
            }
        }
    }
}

/// Evaluate an expression that must not reference any variable
pub fn evaluate_constant(expr: &Expr) -> Option<f64> {
    if expr.free_variables().is_empty() {
        evaluate(expr, &EvalContext::new()).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::parser::parse;
    use crate::core::formula::tokenizer::tokenize;

    fn eval(expression: &str, ctx: &EvalContext) -> Result<f64, EvalError> {
        let tokens = tokenize(expression).map_err(|e| EvalError::new(e.message))?;
        let expr = parse(tokens).map_err(|e| EvalError::new(e.message))?;
        evaluate(&expr, ctx)
    }

    #[test]
    fn test_eval_number() {
        assert_eq!(eval("42", &EvalContext::new()).unwrap(), 42.0);
    }

    #[test]
    fn test_eval_arithmetic() {
        let ctx = EvalContext::new();
        assert_eq!(eval("2 + 3", &ctx).unwrap(), 5.0);
        assert_eq!(eval("10 - 4", &ctx).unwrap(), 6.0);
        assert_eq!(eval("3 * 4", &ctx).unwrap(), 12.0);
        assert_eq!(eval("15 / 3", &ctx).unwrap(), 5.0);
        assert_eq!(eval("2 ** 10", &ctx).unwrap(), 1024.0);
    }

    #[test]
    fn test_eval_precedence() {
        let ctx = EvalContext::new();
        assert_eq!(eval("2 + 3 * 4", &ctx).unwrap(), 14.0);
        assert_eq!(eval("(2 + 3) * 4", &ctx).unwrap(), 20.0);
        assert_eq!(eval("-2 ** 2", &ctx).unwrap(), -4.0);
        assert_eq!(eval("2 ** -1", &ctx).unwrap(), 0.5);
    }

    #[test]
    fn test_eval_variable() {
        let ctx = EvalContext::with_variable("meters", 2.5);
        assert_eq!(eval("meters * 100", &ctx).unwrap(), 250.0);
    }

    #[test]
    fn test_eval_unknown_variable() {
        let err = eval("feet * 12", &EvalContext::new()).unwrap_err();
        assert!(err.message.contains("Unknown variable: feet"));
    }

    #[test]
    fn test_eval_division_by_zero() {
        let ctx = EvalContext::with_variable("x", 0.0);
        assert!(eval("1 / x", &ctx)
            .unwrap_err()
            .message
            .contains("Division by zero"));
        assert!(eval("x ** -1", &ctx)
            .unwrap_err()
            .message
            .contains("Division by zero"));
    }

    #[test]
    fn test_eval_not_real() {
        let ctx = EvalContext::with_variable("x", -8.0);
        let err = eval("x ** 0.5", &ctx).unwrap_err();
        assert!(err.message.contains("real number"));
    }

    #[test]
    fn test_eval_odd_root_of_negative() {
        let ctx = EvalContext::with_variable("x", -8.0);
        let cube_root = eval("x ** (1 / 3)", &ctx).unwrap();
        assert!((cube_root + 2.0).abs() < 1e-12);
        let fifth = eval("x ** 0.2", &EvalContext::with_variable("x", -32.0)).unwrap();
        assert!((fifth + 2.0).abs() < 1e-12);
        // Even roots stay undefined
        assert!(eval("x ** 0.25", &ctx).is_err());
    }

    #[test]
    fn test_evaluate_constant() {
        let tokens = tokenize("9 / 5").unwrap();
        let expr = parse(tokens).unwrap();
        assert_eq!(evaluate_constant(&expr), Some(1.8));

        let tokens = tokenize("x + 1").unwrap();
        let expr = parse(tokens).unwrap();
        assert_eq!(evaluate_constant(&expr), None);
    }
}
