//! Tagged calculation results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::measurement::Measurement;

/// The result of a calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// A scalar (typically a weighted event count).
    Scalar(f64),
    /// A binned measurement.
    Measurement(Measurement),
    /// An uncertainty tuple relative to some nominal value.
    Uncertainty(Box<Uncertainty>),
}

/// Variant tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// [`Value::Scalar`]
    Scalar,
    /// [`Value::Measurement`]
    Measurement,
    /// [`Value::Uncertainty`]
    Uncertainty,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Scalar => f.write_str("scalar"),
            ValueKind::Measurement => f.write_str("measurement"),
            ValueKind::Uncertainty => f.write_str("uncertainty"),
        }
    }
}

/// `(overall_up, overall_down, shape_up, shape_down)`.
///
/// Overall components are scale factors relative to the nominal result.
/// Shape components carry the same type as the nominal result. Either pair
/// may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    /// Upward overall scale factor.
    pub overall_up: Option<f64>,
    /// Downward overall scale factor.
    pub overall_down: Option<f64>,
    /// Upward varied result.
    pub shape_up: Option<Value>,
    /// Downward varied result.
    pub shape_down: Option<Value>,
}

impl Uncertainty {
    /// An uncertainty carrying only overall factors.
    pub fn overall(up: f64, down: f64) -> Self {
        Self { overall_up: Some(up), overall_down: Some(down), shape_up: None, shape_down: None }
    }

    /// An uncertainty carrying only shape variations.
    pub fn shape(up: Value, down: Value) -> Self {
        Self { overall_up: None, overall_down: None, shape_up: Some(up), shape_down: Some(down) }
    }

    /// Both overall components, if present.
    pub fn overall_pair(&self) -> Option<(f64, f64)> {
        match (self.overall_up, self.overall_down) {
            (Some(u), Some(d)) => Some((u, d)),
            _ => None,
        }
    }

    /// Both shape components, if present.
    pub fn shape_pair(&self) -> Option<(&Value, &Value)> {
        match (&self.shape_up, &self.shape_down) {
            (Some(u), Some(d)) => Some((u, d)),
            _ => None,
        }
    }
}

impl Value {
    /// Variant tag.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Measurement(_) => ValueKind::Measurement,
            Value::Uncertainty(_) => ValueKind::Uncertainty,
        }
    }

    /// Wrap an uncertainty tuple.
    pub fn uncertainty(u: Uncertainty) -> Self {
        Value::Uncertainty(Box::new(u))
    }

    /// The scalar, or a type-mismatch error.
    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(v) => Ok(*v),
            other => Err(Error::TypeMismatch(format!("expected scalar, got {}", other.kind()))),
        }
    }

    /// The measurement, or a type-mismatch error.
    pub fn as_measurement(&self) -> Result<&Measurement> {
        match self {
            Value::Measurement(m) => Ok(m),
            other => {
                Err(Error::TypeMismatch(format!("expected measurement, got {}", other.kind())))
            }
        }
    }

    /// The uncertainty tuple, or a type-mismatch error.
    pub fn as_uncertainty(&self) -> Result<&Uncertainty> {
        match self {
            Value::Uncertainty(u) => Ok(u),
            other => {
                Err(Error::TypeMismatch(format!("expected uncertainty, got {}", other.kind())))
            }
        }
    }

    /// Total: the scalar itself, or the in-range integral of a measurement.
    pub fn integral(&self) -> Result<f64> {
        match self {
            Value::Scalar(v) => Ok(*v),
            Value::Measurement(m) => Ok(m.integral()),
            Value::Uncertainty(_) => {
                Err(Error::TypeMismatch("an uncertainty tuple has no integral".to_string()))
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Measurement> for Value {
    fn from(m: Measurement) -> Self {
        Value::Measurement(m)
    }
}

impl From<Uncertainty> for Value {
    fn from(u: Uncertainty) -> Self {
        Value::uncertainty(u)
    }
}
