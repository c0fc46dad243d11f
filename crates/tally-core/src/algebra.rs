//! Linear algebra over calculation results.
//!
//! `add` and `multiply` work uniformly on scalars, measurements and
//! uncertainty tuples. Operands are never modified.

use crate::error::{Error, Result};
use crate::value::{Uncertainty, Value};

/// `c1 * v1 + c2 * v2`.
///
/// Both values must carry the same variant (and, for measurements, the same
/// binning). Uncertainty tuples are combined component-wise; a component
/// present in only one operand is dropped from the result.
pub fn add(c1: f64, v1: &Value, c2: f64, v2: &Value) -> Result<Value> {
    match (v1, v2) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(c1 * a + c2 * b)),
        (Value::Measurement(a), Value::Measurement(b)) => {
            Ok(Value::Measurement(a.combined(c1, b, c2)?))
        }
        (Value::Uncertainty(a), Value::Uncertainty(b)) => {
            let overall = |x: Option<f64>, y: Option<f64>| match (x, y) {
                (Some(x), Some(y)) => Some(c1 * x + c2 * y),
                _ => None,
            };
            let shape = |x: &Option<Value>, y: &Option<Value>| -> Result<Option<Value>> {
                match (x, y) {
                    (Some(x), Some(y)) => Ok(Some(add(c1, x, c2, y)?)),
                    _ => Ok(None),
                }
            };
            Ok(Value::uncertainty(Uncertainty {
                overall_up: overall(a.overall_up, b.overall_up),
                overall_down: overall(a.overall_down, b.overall_down),
                shape_up: shape(&a.shape_up, &b.shape_up)?,
                shape_down: shape(&a.shape_down, &b.shape_down)?,
            }))
        }
        (a, b) => Err(Error::TypeMismatch(format!(
            "values must be of the same type, got {} and {}",
            a.kind(),
            b.kind()
        ))),
    }
}

/// `c * v`.
pub fn multiply(c: f64, v: &Value) -> Value {
    match v {
        Value::Scalar(x) => Value::Scalar(c * x),
        Value::Measurement(m) => Value::Measurement(m.scaled(c)),
        Value::Uncertainty(u) => Value::uncertainty(Uncertainty {
            overall_up: u.overall_up.map(|x| c * x),
            overall_down: u.overall_down.map(|x| c * x),
            shape_up: u.shape_up.as_ref().map(|s| multiply(c, s)),
            shape_down: u.shape_down.as_ref().map(|s| multiply(c, s)),
        }),
    }
}
