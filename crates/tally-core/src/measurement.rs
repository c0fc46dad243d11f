//! N-dimensional binned measurement with per-bin errors.

use serde::{Deserialize, Serialize};

use crate::binning::{Binning, validate_edges};
use crate::error::{Error, Result};

/// Maximum supported number of axes.
pub const MAX_DIMENSIONS: usize = 3;

/// A binned measurement of 1–3 dimensions.
///
/// Every axis carries an underflow bin (index 0) and an overflow bin
/// (index `n_bins + 1`). Storage is flat with axis 0 varying fastest, so the
/// global index of `(ix, iy, iz)` is `ix + nx' * (iy + ny' * iz)` where
/// `n' = n_bins + 2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Bin edges per axis.
    edges: Vec<Vec<f64>>,
    /// Sum of weights per bin.
    contents: Vec<f64>,
    /// Sum of squared weights per bin.
    sumw2: Vec<f64>,
    /// Unweighted entry count per bin.
    entries: Vec<f64>,
}

impl Measurement {
    /// Create an empty measurement with the given per-axis edges.
    pub fn new(edges: Vec<Vec<f64>>) -> Result<Self> {
        if edges.is_empty() || edges.len() > MAX_DIMENSIONS {
            return Err(Error::Binning(format!(
                "measurements support 1 to {} axes, got {}",
                MAX_DIMENSIONS,
                edges.len()
            )));
        }
        for axis in &edges {
            validate_edges(axis)?;
        }
        let len = edges.iter().map(|e| e.len() + 1).product();
        Ok(Self { edges, contents: vec![0.0; len], sumw2: vec![0.0; len], entries: vec![0.0; len] })
    }

    /// Create an empty measurement from validated binnings.
    pub fn from_binnings(binnings: &[Binning]) -> Result<Self> {
        for b in binnings {
            b.validate()?;
        }
        Self::new(binnings.iter().map(Binning::edges).collect())
    }

    /// Number of axes.
    pub fn dimensions(&self) -> usize {
        self.edges.len()
    }

    /// Edges of one axis.
    pub fn axis_edges(&self, axis: usize) -> &[f64] {
        &self.edges[axis]
    }

    /// Number of in-range bins along one axis.
    pub fn n_bins(&self, axis: usize) -> usize {
        self.edges[axis].len() - 1
    }

    /// Total number of stored bins, including under/overflow.
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether the measurement stores no bins (never true for a valid measurement).
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Global index from per-axis indices (each including the flow offset).
    pub fn index(&self, bins: &[usize]) -> usize {
        let mut idx = 0;
        let mut stride = 1;
        for (axis, &b) in bins.iter().enumerate() {
            idx += b * stride;
            stride *= self.edges[axis].len() + 1;
        }
        idx
    }

    /// Per-axis indices of a global index.
    pub fn axis_indices(&self, mut index: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.edges.len());
        for axis in &self.edges {
            let n = axis.len() + 1;
            out.push(index % n);
            index /= n;
        }
        out
    }

    /// Whether a global index lies inside the histogram range on every axis.
    pub fn is_in_range(&self, index: usize) -> bool {
        self.axis_indices(index)
            .iter()
            .zip(&self.edges)
            .all(|(&b, e)| b >= 1 && b <= e.len() - 1)
    }

    /// Global indices of all in-range bins, in storage order.
    pub fn in_range_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_in_range(i)).collect()
    }

    /// Bin contents (sum of weights), flat.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Sum of squared weights, flat.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Unweighted entries, flat.
    pub fn entries(&self) -> &[f64] {
        &self.entries
    }

    /// Content of one bin.
    pub fn content(&self, index: usize) -> f64 {
        self.contents[index]
    }

    /// Statistical error of one bin, `sqrt(sumw2)`.
    pub fn error(&self, index: usize) -> f64 {
        self.sumw2[index].sqrt()
    }

    /// Set the content of one bin.
    pub fn set_content(&mut self, index: usize, value: f64) {
        self.contents[index] = value;
    }

    /// Locate the global bin for a coordinate tuple (flow bins included).
    pub fn find_bin(&self, coords: &[f64]) -> usize {
        let bins: Vec<usize> = self.edges.iter().zip(coords).map(|(e, &v)| axis_bin(e, v)).collect();
        self.index(&bins)
    }

    /// Add one weighted entry at the given coordinates.
    pub fn fill(&mut self, coords: &[f64], weight: f64) {
        let idx = self.find_bin(coords);
        self.contents[idx] += weight;
        self.sumw2[idx] += weight * weight;
        self.entries[idx] += 1.0;
    }

    /// Sum of in-range bin contents (flows excluded).
    pub fn integral(&self) -> f64 {
        self.in_range_indices().into_iter().map(|i| self.contents[i]).sum()
    }

    /// Whether `other` has identical axes.
    pub fn same_binning(&self, other: &Measurement) -> bool {
        self.edges == other.edges
    }

    /// New measurement with contents transformed and error bookkeeping kept.
    pub fn map_contents(&self, f: impl Fn(f64) -> f64) -> Measurement {
        let mut out = self.clone();
        for c in &mut out.contents {
            *c = f(*c);
        }
        out
    }

    /// New empty measurement with this measurement's axes.
    pub fn zeroed(&self) -> Measurement {
        let len = self.len();
        Measurement {
            edges: self.edges.clone(),
            contents: vec![0.0; len],
            sumw2: vec![0.0; len],
            entries: vec![0.0; len],
        }
    }

    /// `c1 * self + c2 * other`, propagating squared weights.
    pub fn combined(&self, c1: f64, other: &Measurement, c2: f64) -> Result<Measurement> {
        if !self.same_binning(other) {
            return Err(Error::TypeMismatch(
                "measurements must share the same binning".to_string(),
            ));
        }
        let mut out = self.zeroed();
        for i in 0..self.len() {
            out.contents[i] = c1 * self.contents[i] + c2 * other.contents[i];
            out.sumw2[i] = c1 * c1 * self.sumw2[i] + c2 * c2 * other.sumw2[i];
            out.entries[i] = self.entries[i] + other.entries[i];
        }
        Ok(out)
    }

    /// `c * self`, propagating squared weights.
    pub fn scaled(&self, c: f64) -> Measurement {
        let mut out = self.clone();
        for i in 0..out.len() {
            out.contents[i] *= c;
            out.sumw2[i] *= c * c;
        }
        out
    }
}

/// Flow-aware bin index on one axis: 0 for underflow (and NaN),
/// `n_bins + 1` for overflow.
fn axis_bin(edges: &[f64], val: f64) -> usize {
    // Number of edges <= val equals the flow-offset bin index.
    edges.partition_point(|&e| e <= val)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_d() -> Measurement {
        Measurement::new(vec![vec![0.0, 1.0, 2.0, 3.0]]).unwrap()
    }

    #[test]
    fn fill_routes_flows() {
        let mut m = one_d();
        for v in [0.5, 1.5, 2.5, 0.5, -1.0, 3.5, 3.0] {
            m.fill(&[v], 1.0);
        }
        assert_eq!(m.contents(), &[1.0, 2.0, 1.0, 1.0, 2.0]);
        assert_eq!(m.integral(), 4.0);
    }

    #[test]
    fn nan_goes_to_underflow() {
        let mut m = one_d();
        m.fill(&[f64::NAN], 1.0);
        assert_eq!(m.content(0), 1.0);
    }

    #[test]
    fn weights_and_sumw2() {
        let mut m = Measurement::new(vec![vec![0.0, 1.0, 2.0]]).unwrap();
        m.fill(&[0.5], 2.0);
        m.fill(&[1.5], 3.0);
        m.fill(&[0.5], 1.0);
        assert_eq!(m.contents(), &[0.0, 3.0, 3.0, 0.0]);
        assert_eq!(m.sumw2(), &[0.0, 5.0, 9.0, 0.0]);
        assert_eq!(m.entries(), &[0.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn two_d_indexing_round_trips() {
        let mut m = Measurement::new(vec![vec![0.0, 1.0, 2.0], vec![0.0, 10.0]]).unwrap();
        assert_eq!(m.len(), 4 * 3);
        let idx = m.find_bin(&[1.5, 5.0]);
        assert_eq!(m.axis_indices(idx), vec![2, 1]);
        m.fill(&[1.5, 5.0], 1.0);
        m.fill(&[1.5, 50.0], 1.0);
        assert_eq!(m.integral(), 1.0);
        assert_eq!(m.in_range_indices().len(), 2);
    }

    #[test]
    fn rejects_bad_axes() {
        assert!(Measurement::new(vec![]).is_err());
        assert!(Measurement::new(vec![vec![0.0, 1.0]; 4]).is_err());
        assert!(Measurement::new(vec![vec![1.0, 0.0]]).is_err());
    }

    #[test]
    fn combined_requires_same_binning() {
        let a = one_d();
        let b = Measurement::new(vec![vec![0.0, 1.0]]).unwrap();
        assert!(matches!(a.combined(1.0, &b, 1.0), Err(Error::TypeMismatch(_))));
    }
}
