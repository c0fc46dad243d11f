//! Uncertainty calculations.
//!
//! Each wraps a nominal calculation and returns a [`Value::Uncertainty`]:
//! overall scale factors, shape variations, or both.

use std::sync::Arc;

use tally_core::{Error, FingerprintBuilder, Fingerprinted, Result, Uncertainty, Value};
use tally_model::{Process, Region, Reweighted};

use crate::calculation::{Calculation, HigherOrderCalculation};
use crate::context::CallContext;

/// A named source of uncertainty on a wrapped calculation.
pub trait UncertaintyCalculation: HigherOrderCalculation {
    /// Display name of the uncertainty source.
    fn name(&self) -> &str;
}

/// Poisson-like statistical variation: `v ± sqrt(|v|)`, per bin including
/// under- and overflow.
#[derive(Clone)]
pub struct StatisticalUncertainty {
    calc: Arc<dyn Calculation>,
}

impl StatisticalUncertainty {
    /// Statistical uncertainty on `calc`.
    pub fn new(calc: Arc<dyn Calculation>) -> Self {
        Self { calc }
    }
}

fn poisson_up(v: f64) -> f64 {
    v + v.abs().sqrt()
}

fn poisson_down(v: f64) -> f64 {
    v - v.abs().sqrt()
}

impl Fingerprinted for StatisticalUncertainty {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("statistical").nested(&self.calc);
    }
}

impl Calculation for StatisticalUncertainty {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let (up, down) = match self.calc.call_with(process, region, ctx)? {
            Value::Scalar(v) => (Value::Scalar(poisson_up(v)), Value::Scalar(poisson_down(v))),
            Value::Measurement(m) => (
                Value::Measurement(m.map_contents(poisson_up)),
                Value::Measurement(m.map_contents(poisson_down)),
            ),
            Value::Uncertainty(_) => {
                return Err(Error::TypeMismatch(
                    "statistical uncertainty of an uncertainty".to_string(),
                ));
            }
        };
        Ok(Value::uncertainty(Uncertainty::shape(up, down)))
    }
}

impl HigherOrderCalculation for StatisticalUncertainty {
    fn calculation(&self) -> &Arc<dyn Calculation> {
        &self.calc
    }
}

impl UncertaintyCalculation for StatisticalUncertainty {
    fn name(&self) -> &str {
        "Statistical"
    }
}

/// Fixed up/down scale factors, independent of the data.
#[derive(Clone)]
pub struct OverallUncertainty {
    name: String,
    up: f64,
    down: f64,
    calc: Arc<dyn Calculation>,
}

impl OverallUncertainty {
    /// Scale factors `up` and `down` (e.g. 1.05 and 0.95) on `calc`.
    pub fn new(name: impl Into<String>, up: f64, down: f64, calc: Arc<dyn Calculation>) -> Self {
        Self { name: name.into(), up, down, calc }
    }
}

impl Fingerprinted for OverallUncertainty {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("overall").f64(self.up).f64(self.down).nested(&self.calc);
    }
}

impl Calculation for OverallUncertainty {
    fn call_with(&self, _process: &Process, _region: &Region, _ctx: &CallContext<'_>) -> Result<Value> {
        Ok(Value::uncertainty(Uncertainty::overall(self.up, self.down)))
    }
}

impl HigherOrderCalculation for OverallUncertainty {
    fn calculation(&self) -> &Arc<dyn Calculation> {
        &self.calc
    }
}

impl UncertaintyCalculation for OverallUncertainty {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Shape variation from alternative event weights.
///
/// The up and down results are the wrapped calculation on the region
/// reweighted by `up_weight` and `down_weight`.
#[derive(Clone)]
pub struct WeightUncertainty {
    name: String,
    up_weight: String,
    down_weight: String,
    calc: Arc<dyn Calculation>,
}

impl WeightUncertainty {
    /// Reweighting variation on `calc`.
    pub fn new(
        name: impl Into<String>,
        up_weight: impl Into<String>,
        down_weight: impl Into<String>,
        calc: Arc<dyn Calculation>,
    ) -> Self {
        Self { name: name.into(), up_weight: up_weight.into(), down_weight: down_weight.into(), calc }
    }
}

impl Fingerprinted for WeightUncertainty {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("weight").str(&self.up_weight).str(&self.down_weight).nested(&self.calc);
    }
}

impl Calculation for WeightUncertainty {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let up = self.calc.call_with(process, &region.varied(Reweighted::new(&self.up_weight)), ctx)?;
        let down =
            self.calc.call_with(process, &region.varied(Reweighted::new(&self.down_weight)), ctx)?;
        Ok(Value::uncertainty(Uncertainty::shape(up, down)))
    }
}

impl HigherOrderCalculation for WeightUncertainty {
    fn calculation(&self) -> &Arc<dyn Calculation> {
        &self.calc
    }
}

impl UncertaintyCalculation for WeightUncertainty {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Shape variation from alternative trees of the same sources.
#[derive(Clone)]
pub struct TreeUncertainty {
    name: String,
    up_tree: String,
    down_tree: String,
    calc: Arc<dyn Calculation>,
}

impl TreeUncertainty {
    /// Tree variation on `calc`.
    pub fn new(
        name: impl Into<String>,
        up_tree: impl Into<String>,
        down_tree: impl Into<String>,
        calc: Arc<dyn Calculation>,
    ) -> Self {
        Self { name: name.into(), up_tree: up_tree.into(), down_tree: down_tree.into(), calc }
    }
}

impl Fingerprinted for TreeUncertainty {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("tree").str(&self.up_tree).str(&self.down_tree).nested(&self.calc);
    }
}

impl Calculation for TreeUncertainty {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let up = self.calc.call_with(&process.retreed(&self.up_tree), region, ctx)?;
        let down = self.calc.call_with(&process.retreed(&self.down_tree), region, ctx)?;
        Ok(Value::uncertainty(Uncertainty::shape(up, down)))
    }
}

impl HigherOrderCalculation for TreeUncertainty {
    fn calculation(&self) -> &Arc<dyn Calculation> {
        &self.calc
    }
}

impl UncertaintyCalculation for TreeUncertainty {
    fn name(&self) -> &str {
        &self.name
    }
}
