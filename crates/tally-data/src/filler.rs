//! Single-pass measurement filling and weighted counting over event tables.
//!
//! A row is selected when the selection evaluates `> 0`; an absent
//! selection keeps every row and an absent weight counts each row once.

use tally_core::{Binning, Error, Measurement, Result};

use crate::expr::CompiledExpr;
use crate::table::Table;

fn compile_optional(expr: &str) -> Result<Option<CompiledExpr>> {
    if expr.trim().is_empty() { Ok(None) } else { CompiledExpr::compile(expr).map(Some) }
}

/// Specification for filling one measurement.
#[derive(Debug, Clone)]
pub struct FillSpec {
    /// One expression per axis.
    pub expressions: Vec<CompiledExpr>,
    /// Bin edges per axis.
    pub edges: Vec<Vec<f64>>,
    /// Optional selection expression (rows passing if > 0).
    pub selection: Option<CompiledExpr>,
    /// Optional weight expression.
    pub weight: Option<CompiledExpr>,
}

impl FillSpec {
    /// Compile a spec; empty `selection`/`weight` strings mean "absent".
    pub fn new<S: AsRef<str>>(
        expressions: &[S],
        binnings: &[Binning],
        selection: &str,
        weight: &str,
    ) -> Result<Self> {
        if expressions.len() != binnings.len() {
            return Err(Error::Binning(format!(
                "{} expressions but {} binnings",
                expressions.len(),
                binnings.len()
            )));
        }
        for b in binnings {
            b.validate()?;
        }
        Ok(Self {
            expressions: expressions
                .iter()
                .map(|e| CompiledExpr::compile(e.as_ref()))
                .collect::<Result<_>>()?,
            edges: binnings.iter().map(Binning::edges).collect(),
            selection: compile_optional(selection)?,
            weight: compile_optional(weight)?,
        })
    }
}

/// Per-row weights with unselected rows marked `None`.
fn row_weights(
    table: &Table,
    selection: Option<&CompiledExpr>,
    weight: Option<&CompiledExpr>,
) -> Result<Vec<Option<f64>>> {
    let sel = selection.map(|s| s.eval_table(table)).transpose()?;
    let w = weight.map(|w| w.eval_table(table)).transpose()?;
    Ok((0..table.n_rows())
        .map(|i| {
            if let Some(sel) = &sel
                && sel[i] <= 0.0
            {
                return None;
            }
            Some(w.as_ref().map_or(1.0, |w| w[i]))
        })
        .collect())
}

/// Weighted count of selected rows.
pub fn count(table: &Table, selection: &str, weight: &str) -> Result<f64> {
    let selection = compile_optional(selection)?;
    let weight = compile_optional(weight)?;
    Ok(row_weights(table, selection.as_ref(), weight.as_ref())?.into_iter().flatten().sum())
}

/// Fill several measurements in a single pass over the table.
pub fn fill_measurements(specs: &[FillSpec], table: &Table) -> Result<Vec<Measurement>> {
    let mut results = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut m = Measurement::new(spec.edges.clone())?;
        if spec.expressions.len() != spec.edges.len() {
            return Err(Error::Binning(format!(
                "{} expressions but {} axes",
                spec.expressions.len(),
                spec.edges.len()
            )));
        }
        let axes: Vec<Vec<f64>> =
            spec.expressions.iter().map(|e| e.eval_table(table)).collect::<Result<_>>()?;
        let weights = row_weights(table, spec.selection.as_ref(), spec.weight.as_ref())?;

        let mut coords = vec![0.0; axes.len()];
        for (row, w) in weights.into_iter().enumerate() {
            let Some(w) = w else { continue };
            for (c, axis) in coords.iter_mut().zip(&axes) {
                *c = axis[row];
            }
            m.fill(&coords, w);
        }
        results.push(m);
    }
    Ok(results)
}

/// Fill one measurement.
pub fn fill_measurement(spec: &FillSpec, table: &Table) -> Result<Measurement> {
    let mut out = fill_measurements(std::slice::from_ref(spec), table)?;
    out.pop().ok_or_else(|| Error::Data("no measurement produced".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> Table {
        Table::from_columns([
            ("x", vec![-1.0, 0.5, 1.5, 2.5, 5.0]),
            ("y", vec![0.5, 0.5, 1.5, 1.5, 0.5]),
            ("w", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        ])
        .unwrap()
    }

    #[test]
    fn count_with_selection_and_weight() {
        let t = table();
        assert_relative_eq!(count(&t, "x > 0", "w").unwrap(), 14.0);
        assert_relative_eq!(count(&t, "", "w").unwrap(), 15.0);
        assert_relative_eq!(count(&t, "x > 0", "").unwrap(), 4.0);
        assert_relative_eq!(count(&t, "", "").unwrap(), 5.0);
    }

    #[test]
    fn count_missing_column_errors() {
        assert!(count(&table(), "z > 0", "").is_err());
    }

    #[test]
    fn one_d_fill_keeps_flows() {
        let spec = FillSpec::new(&["x"], &[Binning::fixed(0.0, 3.0, 3).unwrap()], "", "w").unwrap();
        let m = fill_measurement(&spec, &table()).unwrap();
        assert_eq!(m.contents(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(m.sumw2(), &[1.0, 4.0, 9.0, 16.0, 25.0]);
        assert_relative_eq!(m.integral(), 9.0);
    }

    #[test]
    fn two_d_fill() {
        let spec = FillSpec::new(
            &["x", "y"],
            &[Binning::fixed(0.0, 3.0, 3).unwrap(), Binning::variable(vec![0.0, 1.0, 2.0]).unwrap()],
            "x > 0 && x < 3",
            "",
        )
        .unwrap();
        let m = fill_measurement(&spec, &table()).unwrap();
        assert_eq!(m.content(m.find_bin(&[0.5, 0.5])), 1.0);
        assert_eq!(m.content(m.find_bin(&[1.5, 1.5])), 1.0);
        assert_eq!(m.content(m.find_bin(&[2.5, 1.5])), 1.0);
        assert_relative_eq!(m.integral(), 3.0);
    }

    #[test]
    fn axis_count_must_match() {
        assert!(FillSpec::new(&["x", "y"], &[Binning::fixed(0.0, 1.0, 1).unwrap()], "", "").is_err());
    }
}
