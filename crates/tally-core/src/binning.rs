//! Axis binning specifications.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::{FingerprintBuilder, Fingerprinted};

/// Binning of a single histogram axis.
///
/// In configuration files a fixed binning is written as a mapping
/// (`{low: 0, high: 100, n_bins: 20}`) and a variable binning as a list of
/// edges (`[0, 10, 25, 50, 100]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binning {
    /// `n_bins` equal-width bins spanning `[low, high)`.
    Fixed {
        /// Lower edge of the first bin.
        low: f64,
        /// Upper edge of the last bin.
        high: f64,
        /// Number of bins (excluding under/overflow).
        n_bins: usize,
    },
    /// Explicit, strictly increasing bin edges.
    Variable(Vec<f64>),
}

impl Binning {
    /// Create a validated fixed-width binning.
    pub fn fixed(low: f64, high: f64, n_bins: usize) -> Result<Self> {
        let b = Binning::Fixed { low, high, n_bins };
        b.validate()?;
        Ok(b)
    }

    /// Create a validated variable-width binning.
    pub fn variable(edges: impl Into<Vec<f64>>) -> Result<Self> {
        let b = Binning::Variable(edges.into());
        b.validate()?;
        Ok(b)
    }

    /// Check the binning invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            Binning::Fixed { low, high, n_bins } => {
                if *n_bins < 1 {
                    return Err(Error::Binning(format!("n_bins must be >= 1, got {}", n_bins)));
                }
                if !(low.is_finite() && high.is_finite()) {
                    return Err(Error::Binning(format!(
                        "range must be finite, got [{}, {})",
                        low, high
                    )));
                }
                if low >= high {
                    return Err(Error::Binning(format!(
                        "low must be < high, got low={} high={}",
                        low, high
                    )));
                }
                Ok(())
            }
            Binning::Variable(edges) => validate_edges(edges),
        }
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        match self {
            Binning::Fixed { n_bins, .. } => *n_bins,
            Binning::Variable(edges) => edges.len().saturating_sub(1),
        }
    }

    /// Bin edges (length `n_bins + 1`).
    pub fn edges(&self) -> Vec<f64> {
        match self {
            Binning::Fixed { low, high, n_bins } => {
                let width = (high - low) / *n_bins as f64;
                let mut edges: Vec<f64> = (0..*n_bins).map(|i| low + i as f64 * width).collect();
                edges.push(*high);
                edges
            }
            Binning::Variable(edges) => edges.clone(),
        }
    }
}

impl Fingerprinted for Binning {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        match self {
            Binning::Fixed { low, high, n_bins } => {
                fp.str("fixed").f64(*low).f64(*high).u64(*n_bins as u64);
            }
            Binning::Variable(edges) => {
                fp.str("variable").u64(edges.len() as u64);
                for e in edges {
                    fp.f64(*e);
                }
            }
        }
    }
}

/// Validate an explicit edge list: at least two finite, strictly increasing edges.
pub fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Binning(format!("need at least 2 edges, got {}", edges.len())));
    }
    if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
        return Err(Error::Binning(format!("edges must be finite, got {}", bad)));
    }
    for w in edges.windows(2) {
        if w[1] <= w[0] {
            return Err(Error::Binning(format!(
                "edges must be strictly increasing, got {} followed by {}",
                w[0], w[1]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_edges() {
        let b = Binning::fixed(0.0, 10.0, 5).unwrap();
        assert_eq!(b.n_bins(), 5);
        assert_eq!(b.edges(), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn fixed_rejects_empty_or_inverted() {
        assert!(matches!(Binning::fixed(0.0, 1.0, 0), Err(Error::Binning(_))));
        assert!(matches!(Binning::fixed(1.0, 1.0, 3), Err(Error::Binning(_))));
        assert!(matches!(Binning::fixed(2.0, 1.0, 3), Err(Error::Binning(_))));
    }

    #[test]
    fn variable_rejects_non_increasing() {
        assert!(Binning::variable(vec![0.0, 1.0, 1.0]).is_err());
        assert!(Binning::variable(vec![0.0, 2.0, 1.0]).is_err());
        assert!(Binning::variable(vec![0.0]).is_err());
        assert!(Binning::variable(vec![0.0, f64::NAN]).is_err());
        assert_eq!(Binning::variable(vec![0.0, 1.0, 5.0]).unwrap().n_bins(), 2);
    }

    #[test]
    fn yaml_shapes_deserialize() {
        let fixed: Binning = serde_json::from_str(r#"{"low": 0, "high": 4, "n_bins": 2}"#).unwrap();
        assert_eq!(fixed, Binning::Fixed { low: 0.0, high: 4.0, n_bins: 2 });
        let var: Binning = serde_json::from_str("[0, 1, 3]").unwrap();
        assert_eq!(var, Binning::Variable(vec![0.0, 1.0, 3.0]));
    }
}
