//! Minimal comparison expressions over property values.
//!
//! Used by value-matching conditions (`expr:` prefixed match values) and by
//! refresh validation strings. The candidate value is written as `$`:
//! `$<6`, `$ == on`, `10 >= $`. Both sides are compared numerically when
//! they both parse as numbers, otherwise as strings (equality only).

use crate::error::{BeanError, BeanResult};

const OPS: [&str; 6] = ["<=", ">=", "==", "!=", "<", ">"];

/// Evaluates a comparison expression with `$` bound to `value`.
pub(crate) fn eval(expr: &str, value: &str) -> BeanResult<bool> {
    let expr = expr.trim();
    let (op, pos) = OPS
        .iter()
        .filter_map(|op| expr.find(op).map(|pos| (*op, pos)))
        .min_by_key(|(_, pos)| *pos)
        .ok_or_else(|| {
            BeanError::Validation(format!("no comparison operator in {:?}", expr))
        })?;

    let lhs = substitute(&expr[..pos], value)?;
    let rhs = substitute(&expr[pos + op.len()..], value)?;
    compare(op, &lhs, &rhs)
}

fn substitute(side: &str, value: &str) -> BeanResult<String> {
    let side = side.trim();
    if side.is_empty() {
        return Err(BeanError::Validation(
            "comparison side is empty".to_string(),
        ));
    }
    Ok(if side == "$" {
        value.to_string()
    } else {
        side.to_string()
    })
}

fn compare(op: &str, lhs: &str, rhs: &str) -> BeanResult<bool> {
    if let (Ok(a), Ok(b)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        return Ok(match op {
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            ">=" => a >= b,
            "==" => a == b,
            "!=" => a != b,
            _ => unreachable!(),
        });
    }
    match op {
        "==" => Ok(lhs == rhs),
        "!=" => Ok(lhs != rhs),
        _ => Err(BeanError::Validation(format!(
            "cannot order non-numeric values {:?} {} {:?}",
            lhs, op, rhs
        ))),
    }
}
