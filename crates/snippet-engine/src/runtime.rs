//! Runtime value semantics: operator application, accessors and the
//! output-kind casts. Missing values propagate through every operator and
//! cast; only the explicit accessors fault on them.

use crate::ast::{Accessor, BinaryOp, UnaryOp};
use snippet_model::{CellValue, ValueKind};
use thiserror::Error;

/// A fault raised while evaluating a compiled snippet. Recovered per row by
/// the row binder; never propagated as a panic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("missing value has no {accessor}() representation")]
    MissingAccess { accessor: &'static str },
    #[error("cannot apply `{op}` to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("cannot apply `{op}` to {value}")]
    InvalidOperand {
        op: &'static str,
        value: &'static str,
    },
    #[error("cannot cast {from} to {to}")]
    InvalidCast {
        from: &'static str,
        to: &'static str,
    },
    #[error("function `{name}` failed: {message}")]
    Function { name: String, message: String },
}

/// Textual rendering used by string concatenation and `text()`.
/// Callers ensure the value is not missing.
pub fn display_text(value: &CellValue) -> String {
    value.to_string()
}

pub fn apply_unary(op: UnaryOp, value: CellValue) -> Result<CellValue, EvalError> {
    if value.is_missing() {
        return Ok(CellValue::Missing);
    }
    match (op, value) {
        (UnaryOp::Neg, CellValue::Int(i)) => Ok(CellValue::Int(i.wrapping_neg())),
        (UnaryOp::Neg, CellValue::Real(n)) => Ok(CellValue::Real(-n)),
        (UnaryOp::Not, CellValue::Bool(b)) => Ok(CellValue::Bool(!b)),
        (op, value) => Err(EvalError::InvalidOperand {
            op: op.symbol(),
            value: value.kind_name(),
        }),
    }
}

pub fn apply_binary(op: BinaryOp, left: CellValue, right: CellValue) -> Result<CellValue, EvalError> {
    if left.is_missing() || right.is_missing() {
        return Ok(CellValue::Missing);
    }
    match op {
        BinaryOp::Add => {
            // `+` concatenates as soon as either operand is text.
            if matches!(left, CellValue::Text(_)) || matches!(right, CellValue::Text(_)) {
                let mut s = display_text(&left);
                s.push_str(&display_text(&right));
                return Ok(CellValue::Text(s));
            }
            numeric_binary(op, left, right)
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            numeric_binary(op, left, right)
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            compare(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (CellValue::Bool(a), CellValue::Bool(b)) => Ok(CellValue::Bool(if op == BinaryOp::And {
                a && b
            } else {
                a || b
            })),
            (left, right) => Err(EvalError::InvalidOperands {
                op: op.symbol(),
                left: left.kind_name(),
                right: right.kind_name(),
            }),
        },
    }
}

fn numeric_binary(op: BinaryOp, left: CellValue, right: CellValue) -> Result<CellValue, EvalError> {
    match (left, right) {
        (CellValue::Int(a), CellValue::Int(b)) => int_binary(op, a, b),
        (CellValue::Int(a), CellValue::Real(b)) => real_binary(op, a as f64, b),
        (CellValue::Real(a), CellValue::Int(b)) => real_binary(op, a, b as f64),
        (CellValue::Real(a), CellValue::Real(b)) => real_binary(op, a, b),
        (left, right) => Err(EvalError::InvalidOperands {
            op: op.symbol(),
            left: left.kind_name(),
            right: right.kind_name(),
        }),
    }
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> Result<CellValue, EvalError> {
    let v = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        _ => unreachable!("non-arithmetic op in int_binary"),
    };
    Ok(CellValue::Int(v))
}

fn real_binary(op: BinaryOp, a: f64, b: f64) -> Result<CellValue, EvalError> {
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("non-arithmetic op in real_binary"),
    };
    Ok(CellValue::Real(v))
}

fn compare(op: BinaryOp, left: CellValue, right: CellValue) -> Result<CellValue, EvalError> {
    let ord = match (&left, &right) {
        (CellValue::Int(a), CellValue::Int(b)) => a.partial_cmp(b),
        (CellValue::Int(a), CellValue::Real(b)) => (*a as f64).partial_cmp(b),
        (CellValue::Real(a), CellValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (CellValue::Real(a), CellValue::Real(b)) => a.partial_cmp(b),
        (CellValue::Text(a), CellValue::Text(b)) => Some(a.cmp(b)),
        (CellValue::Bool(a), CellValue::Bool(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EvalError::InvalidOperands {
                op: op.symbol(),
                left: left.kind_name(),
                right: right.kind_name(),
            });
        }
    };
    let result = match (op, ord) {
        // NaN comparisons follow IEEE semantics: only `!=` holds.
        (BinaryOp::Eq, ord) => ord == Some(std::cmp::Ordering::Equal),
        (BinaryOp::Ne, ord) => ord != Some(std::cmp::Ordering::Equal),
        (BinaryOp::Lt, Some(ord)) => ord == std::cmp::Ordering::Less,
        (BinaryOp::Le, Some(ord)) => ord != std::cmp::Ordering::Greater,
        (BinaryOp::Gt, Some(ord)) => ord == std::cmp::Ordering::Greater,
        (BinaryOp::Ge, Some(ord)) => ord != std::cmp::Ordering::Less,
        (_, None) => false,
        _ => unreachable!("non-comparison op in compare"),
    };
    Ok(CellValue::Bool(result))
}

pub fn access(accessor: Accessor, value: CellValue) -> Result<CellValue, EvalError> {
    match (accessor, value) {
        (Accessor::Int, CellValue::Int(i)) => Ok(CellValue::Int(i)),
        (Accessor::Real, CellValue::Real(n)) => Ok(CellValue::Real(n)),
        (Accessor::Real, CellValue::Int(i)) => Ok(CellValue::Real(i as f64)),
        (accessor, CellValue::Missing) => Err(EvalError::MissingAccess {
            accessor: accessor.name(),
        }),
        (accessor, value) => Err(EvalError::InvalidCast {
            from: value.kind_name(),
            to: accessor.name(),
        }),
    }
}

/// Output-kind cast helper (`int(..)`, `real(..)`, `text(..)`): boxes the
/// final expression value into the declared output representation.
pub fn cast(kind: ValueKind, value: CellValue) -> Result<CellValue, EvalError> {
    if value.is_missing() {
        return Ok(CellValue::Missing);
    }
    match (kind, value) {
        (ValueKind::Int, CellValue::Int(i)) => Ok(CellValue::Int(i)),
        (ValueKind::Int, CellValue::Real(n)) => Ok(CellValue::Int(n.trunc() as i64)),
        (ValueKind::Real, CellValue::Int(i)) => Ok(CellValue::Real(i as f64)),
        (ValueKind::Real, CellValue::Real(n)) => Ok(CellValue::Real(n)),
        (ValueKind::Text, value) => Ok(CellValue::Text(display_text(&value))),
        (kind, value) => Err(EvalError::InvalidCast {
            from: value.kind_name(),
            to: kind.decl_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn int_arithmetic_stays_int() {
        let v = apply_binary(BinaryOp::Add, CellValue::Int(2), CellValue::Int(3)).unwrap();
        assert_eq!(v, CellValue::Int(5));
    }

    #[test]
    fn mixed_arithmetic_widens_to_real() {
        let v = apply_binary(BinaryOp::Mul, CellValue::Int(2), CellValue::Real(1.5)).unwrap();
        assert_eq!(v, CellValue::Real(3.0));
    }

    #[test]
    fn int_division_by_zero_faults() {
        let err = apply_binary(BinaryOp::Div, CellValue::Int(1), CellValue::Int(0)).unwrap_err();
        assert_eq!(err, EvalError::DivisionByZero);
    }

    #[test]
    fn real_division_by_zero_is_infinite() {
        let v = apply_binary(BinaryOp::Div, CellValue::Real(1.0), CellValue::Real(0.0)).unwrap();
        assert_eq!(v, CellValue::Real(f64::INFINITY));
    }

    #[test]
    fn text_concatenation_stringizes_other_operand() {
        let v = apply_binary(
            BinaryOp::Add,
            CellValue::Text("n=".to_string()),
            CellValue::Int(4),
        )
        .unwrap();
        assert_eq!(v, CellValue::Text("n=4".to_string()));
    }

    #[test]
    fn missing_propagates_through_operators() {
        let v = apply_binary(BinaryOp::Add, CellValue::Missing, CellValue::Int(1)).unwrap();
        assert_eq!(v, CellValue::Missing);
        let v = apply_unary(UnaryOp::Neg, CellValue::Missing).unwrap();
        assert_eq!(v, CellValue::Missing);
        let v = cast(ValueKind::Text, CellValue::Missing).unwrap();
        assert_eq!(v, CellValue::Missing);
    }

    #[test]
    fn accessor_on_missing_faults() {
        let err = access(Accessor::Real, CellValue::Missing).unwrap_err();
        assert_eq!(err, EvalError::MissingAccess { accessor: "real" });
    }

    #[test]
    fn int_cast_truncates_toward_zero() {
        assert_eq!(cast(ValueKind::Int, CellValue::Real(2.9)).unwrap(), CellValue::Int(2));
        assert_eq!(cast(ValueKind::Int, CellValue::Real(-2.9)).unwrap(), CellValue::Int(-2));
    }

    #[test]
    fn int_cast_of_text_faults() {
        let err = cast(ValueKind::Int, CellValue::Text("5".to_string())).unwrap_err();
        assert_eq!(
            err,
            EvalError::InvalidCast {
                from: "text",
                to: "Int"
            }
        );
    }

    #[test]
    fn nan_compares_unequal_to_itself() {
        let v = compare(BinaryOp::Eq, CellValue::Real(f64::NAN), CellValue::Real(f64::NAN)).unwrap();
        assert_eq!(v, CellValue::Bool(false));
        let v = compare(BinaryOp::Ne, CellValue::Real(f64::NAN), CellValue::Real(f64::NAN)).unwrap();
        assert_eq!(v, CellValue::Bool(true));
    }
}
