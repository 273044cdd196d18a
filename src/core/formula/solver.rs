//! Restricted equation solver
//!
//! Solves `output = f(x)` for `x` by peeling operators off `f` and applying
//! their inverses to the other side. Expressions where `x` occurs more than
//! once are solved only when they are affine in `x`. Constant subtrees are
//! folded so the inverse prints compactly.

use super::evaluator::evaluate_constant;
use super::parser::{BinOp, Expr};
use super::FormulaError;

/// Solve `target = expr` for `var`, returning the isolated expression
pub fn solve_for(expr: &Expr, var: &str, target: Expr) -> Result<Expr, FormulaError> {
    match expr.occurrences(var) {
        0 => Err(FormulaError::Shape(format!(
            "'{}' does not appear in '{}'",
            var, expr
        ))),
        1 => isolate(expr, var, target).map(simplify),
        n => {
            let (a, b) = affine_coefficients(expr, var).ok_or_else(|| {
                FormulaError::Uninvertible(format!(
                    "'{}' occurs {} times in '{}', which is not affine in it",
                    var, n, expr
                ))
            })?;
            if a == 0.0 {
                return Err(FormulaError::Uninvertible(format!(
                    "'{}' cancels out of '{}'",
                    var, expr
                )));
            }
            let shifted = Expr::binary(BinOp::Sub, target, Expr::number(b));
            Ok(simplify(Expr::binary(BinOp::Div, shifted, Expr::number(a))))
        }
    }
}

/// Move every operator around the single occurrence of `var` onto `target`
fn isolate(expr: &Expr, var: &str, target: Expr) -> Result<Expr, FormulaError> {
    match expr {
        Expr::Variable(name) if name == var => Ok(target),

        Expr::Variable(_) | Expr::Number(_) => Err(FormulaError::Shape(format!(
            "'{}' does not appear in '{}'",
            var, expr
        ))),

        Expr::Negate(operand) => isolate(operand, var, Expr::negate(target)),

        Expr::BinaryOp { op, left, right } => {
            let in_left = left.contains(var);
            let (inner, rest) = if in_left {
                (left.as_ref(), right.as_ref().clone())
            } else {
                (right.as_ref(), left.as_ref().clone())
            };

            let next = match (op, in_left) {
                (BinOp::Add, _) => Expr::binary(BinOp::Sub, target, rest),
                (BinOp::Sub, true) => Expr::binary(BinOp::Add, target, rest),
                (BinOp::Sub, false) => Expr::binary(BinOp::Sub, rest, target),
                (BinOp::Mul, _) => {
                    if evaluate_constant(&rest) == Some(0.0) {
                        return Err(FormulaError::Uninvertible(format!(
                            "'{}' is multiplied by zero in '{}'",
                            var, expr
                        )));
                    }
                    Expr::binary(BinOp::Div, target, rest)
                }
                (BinOp::Div, true) => Expr::binary(BinOp::Mul, target, rest),
                (BinOp::Div, false) => Expr::binary(BinOp::Div, rest, target),
            };

            isolate(inner, var, next)
        }

        Expr::Power { base, exponent } => {
            if exponent.contains(var) {
                return Err(FormulaError::Uninvertible(format!(
                    "'{}' appears in an exponent; its inverse needs a logarithm",
                    var
                )));
            }

            let e = evaluate_constant(exponent).ok_or_else(|| {
                FormulaError::Uninvertible(format!(
                    "exponent '{}' is not a real constant",
                    exponent
                ))
            })?;

            if e == 0.0 {
                return Err(FormulaError::Uninvertible(format!(
                    "'{}' is raised to the power 0",
                    base
                )));
            }
            if e.fract() == 0.0 && (e % 2.0) == 0.0 {
                return Err(FormulaError::Uninvertible(format!(
                    "'{} ** {}' has two real inverse branches (±); refusing to pick one",
                    base, exponent
                )));
            }

            let root = simplify(Expr::binary(
                BinOp::Div,
                Expr::number(1.0),
                exponent.as_ref().clone(),
            ));
            isolate(base, var, Expr::power(target, root))
        }
    }
}

/// Coefficients `(a, b)` with `expr == a * var + b`, when `expr` is affine in `var`
fn affine_coefficients(expr: &Expr, var: &str) -> Option<(f64, f64)> {
    match expr {
        Expr::Number(n) => Some((0.0, *n)),
        Expr::Variable(name) if name == var => Some((1.0, 0.0)),
        Expr::Variable(_) => None,
        Expr::Negate(operand) => {
            let (a, b) = affine_coefficients(operand, var)?;
            Some((-a, -b))
        }
        Expr::BinaryOp { op, left, right } => {
            let (a1, b1) = affine_coefficients(left, var)?;
            let (a2, b2) = affine_coefficients(right, var)?;
            match op {
                BinOp::Add => Some((a1 + a2, b1 + b2)),
                BinOp::Sub => Some((a1 - a2, b1 - b2)),
                BinOp::Mul if a2 == 0.0 => Some((a1 * b2, b1 * b2)),
                BinOp::Mul if a1 == 0.0 => Some((a2 * b1, b2 * b1)),
                BinOp::Mul => None,
                BinOp::Div if a2 == 0.0 && b2 != 0.0 => Some((a1 / b2, b1 / b2)),
                BinOp::Div => None,
            }
        }
        Expr::Power { base, exponent } => {
            let (a1, b1) = affine_coefficients(base, var)?;
            let (a2, b2) = affine_coefficients(exponent, var)?;
            if a2 != 0.0 {
                None
            } else if a1 == 0.0 {
                let value = b1.powf(b2);
                value.is_finite().then_some((0.0, value))
            } else if b2 == 1.0 {
                Some((a1, b1))
            } else {
                None
            }
        }
    }
}

/// Fold constant subtrees and drop identity operations
pub fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::Number(_) | Expr::Variable(_) => expr,

        Expr::Negate(operand) => match simplify(*operand) {
            Expr::Number(n) => Expr::Number(-n),
            Expr::Negate(inner) => *inner,
            other => Expr::negate(other),
        },

        Expr::BinaryOp { op, left, right } => {
            let left = simplify(*left);
            let right = simplify(*right);
            simplify_binary(op, left, right)
        }

        Expr::Power { base, exponent } => {
            let base = simplify(*base);
            let exponent = simplify(*exponent);
            match (&base, &exponent) {
                (Expr::Number(b), Expr::Number(e)) if b.powf(*e).is_finite() => {
                    Expr::Number(b.powf(*e))
                }
                (_, Expr::Number(e)) if *e == 1.0 => base,
                _ => Expr::power(base, exponent),
            }
        }
    }
}

fn simplify_binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    if let (Expr::Number(l), Expr::Number(r)) = (&left, &right) {
        let folded = match op {
            BinOp::Add => Some(l + r),
            BinOp::Sub => Some(l - r),
            BinOp::Mul => Some(l * r),
            BinOp::Div if *r != 0.0 => Some(l / r),
            BinOp::Div => None,
        };
        if let Some(value) = folded.filter(|v| v.is_finite()) {
            return Expr::Number(value);
        }
    }

    match (op, &left, &right) {
        (BinOp::Add, _, Expr::Number(r)) if *r == 0.0 => left,
        (BinOp::Add, Expr::Number(l), _) if *l == 0.0 => right,
        (BinOp::Add, _, Expr::Number(r)) if *r < 0.0 => {
            Expr::binary(BinOp::Sub, left, Expr::Number(-r))
        }
        (BinOp::Sub, _, Expr::Number(r)) if *r == 0.0 => left,
        (BinOp::Sub, Expr::Number(l), _) if *l == 0.0 => Expr::negate(right),
        (BinOp::Sub, _, Expr::Number(r)) if *r < 0.0 => {
            Expr::binary(BinOp::Add, left, Expr::Number(-r))
        }
        (BinOp::Mul, _, Expr::Number(r)) if *r == 1.0 => left,
        (BinOp::Mul, Expr::Number(l), _) if *l == 1.0 => right,
        (BinOp::Div, _, Expr::Number(r)) if *r == 1.0 => left,
        _ => Expr::binary(op, left, right),
    }
}
