//! Estimation: a result built from a linear combination of other
//! `(process, region)` results.
//!
//! An [`Estimator`] expands a target `(process, region)` into weighted
//! components; [`EstimationCalculation`] evaluates an underlying
//! calculation on each component and sums the results.

use std::fmt;
use std::sync::Arc;

use tally_core::{
    Error, FingerprintBuilder, Fingerprinted, Result, Uncertainty, Value, add, multiply,
};
use tally_model::{
    AnalysisConfig, EstimationMethod, Filtered, Process, ProcessLoader, Region, RegionLoader,
    Reweighted, Variation,
};

use crate::band::to_shape;
use crate::calculation::{Calculation, HigherOrderCalculation};
use crate::context::CallContext;
use crate::uncertainty::UncertaintyCalculation;

/// One weighted term of an estimate.
#[derive(Debug, Clone)]
pub struct Component {
    /// Multiplier applied to the term's result.
    pub coefficient: f64,
    /// For uncertainty estimates: contribute the nominal result as both
    /// shape variations instead of the term's uncertainty.
    pub use_nominal: bool,
    /// Process to evaluate.
    pub process: Process,
    /// Region to evaluate.
    pub region: Region,
}

impl Component {
    /// Component evaluating `process` in `region`, scaled by `coefficient`.
    pub fn new(coefficient: f64, process: Process, region: Region) -> Self {
        Self { coefficient, use_nominal: false, process, region }
    }

    /// Mark the component as nominal-only.
    pub fn nominal(mut self) -> Self {
        self.use_nominal = true;
        self
    }
}

/// Expands a target `(process, region)` into components.
pub trait Estimator: Fingerprinted + Send + Sync {
    /// Components of the estimate for `(process, region)`.
    fn components(&self, process: &Process, region: &Region) -> Result<Vec<Component>>;
}

/// The identity estimate: a single component equal to the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl Fingerprinted for Direct {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("direct");
    }
}

impl Estimator for Direct {
    fn components(&self, process: &Process, region: &Region) -> Result<Vec<Component>> {
        Ok(vec![Component::new(1.0, process.clone(), region.clone())])
    }
}

/// One term of a [`Linear`] estimate.
///
/// By default the term evaluates the target process and region. Either can
/// be replaced, and the region is then varied by `variations` in order.
#[derive(Debug, Clone)]
pub struct Term {
    coefficient: f64,
    use_nominal: bool,
    process: Option<Process>,
    region: Option<Region>,
    variations: Vec<Arc<dyn Variation>>,
}

impl Term {
    /// Term with the given coefficient on the target.
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient, use_nominal: false, process: None, region: None, variations: Vec::new() }
    }

    /// Evaluate a fixed process instead of the target process.
    pub fn with_process(mut self, process: Process) -> Self {
        self.process = Some(process);
        self
    }

    /// Evaluate a fixed region instead of the target region.
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Append a region variation.
    pub fn varied(mut self, variation: impl Variation + 'static) -> Self {
        self.variations.push(Arc::new(variation));
        self
    }

    /// Contribute the nominal result in uncertainty estimates.
    pub fn nominal(mut self) -> Self {
        self.use_nominal = true;
        self
    }

    fn component(&self, process: &Process, region: &Region) -> Component {
        let process = self.process.clone().unwrap_or_else(|| process.clone());
        let region = self
            .variations
            .iter()
            .fold(self.region.clone().unwrap_or_else(|| region.clone()), |r, v| {
                r.varied_arc(Arc::clone(v))
            });
        Component { coefficient: self.coefficient, use_nominal: self.use_nominal, process, region }
    }
}

/// A fixed list of terms.
#[derive(Debug, Clone, Default)]
pub struct Linear {
    terms: Vec<Term>,
}

impl Linear {
    /// Estimate from `terms`.
    pub fn new(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    /// Append a term.
    pub fn with_term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }
}

impl Fingerprinted for Linear {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("linear").u64(self.terms.len() as u64);
        for t in &self.terms {
            fp.f64(t.coefficient).bool(t.use_nominal);
            fp.bool(t.process.is_some());
            if let Some(p) = &t.process {
                fp.nested(p);
            }
            fp.bool(t.region.is_some());
            if let Some(r) = &t.region {
                fp.nested(r);
            }
            fp.u64(t.variations.len() as u64);
            for v in &t.variations {
                fp.str(v.kind()).strs(&v.state());
            }
        }
    }
}

impl Estimator for Linear {
    fn components(&self, process: &Process, region: &Region) -> Result<Vec<Component>> {
        Ok(self.terms.iter().map(|t| t.component(process, region)).collect())
    }
}

type ComponentFn = dyn Fn(&Process, &Region) -> Result<Vec<Component>> + Send + Sync;

/// An estimator defined by a closure. Its identity is its name.
#[derive(Clone)]
pub struct FnEstimator {
    name: String,
    f: Arc<ComponentFn>,
}

impl FnEstimator {
    /// Wrap `f` under `name`.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Process, &Region) -> Result<Vec<Component>> + Send + Sync + 'static,
    {
        Self { name: name.into(), f: Arc::new(f) }
    }
}

impl fmt::Debug for FnEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEstimator").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Fingerprinted for FnEstimator {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("fn").str(&self.name);
    }
}

impl Estimator for FnEstimator {
    fn components(&self, process: &Process, region: &Region) -> Result<Vec<Component>> {
        (self.f)(process, region)
    }
}

/// Evaluates an underlying calculation over an estimator's components.
///
/// With a plain underlying calculation the result is `Σ cᵢ·calc(pᵢ, rᵢ)`.
/// With an uncertainty, each component becomes a shape-only uncertainty
/// scaled by its coefficient and the shapes are summed; the result never
/// carries overall factors.
#[derive(Clone)]
pub struct EstimationCalculation {
    estimator: Arc<dyn Estimator>,
    calc: Arc<dyn Calculation>,
    uncertainty: Option<Arc<dyn UncertaintyCalculation>>,
}

impl EstimationCalculation {
    /// Estimate a plain calculation. Calls fail with a type mismatch if it
    /// produces uncertainties; use [`for_uncertainty`](Self::for_uncertainty)
    /// for those.
    pub fn new(estimator: Arc<dyn Estimator>, calc: Arc<dyn Calculation>) -> Self {
        Self { estimator, calc, uncertainty: None }
    }

    /// Estimate an uncertainty.
    pub fn for_uncertainty(
        estimator: Arc<dyn Estimator>,
        uncertainty: Arc<dyn UncertaintyCalculation>,
    ) -> Self {
        let calc: Arc<dyn Calculation> = uncertainty.clone();
        Self { estimator, calc, uncertainty: Some(uncertainty) }
    }

    /// The estimator.
    pub fn estimator(&self) -> &Arc<dyn Estimator> {
        &self.estimator
    }

    fn components(&self, process: &Process, region: &Region) -> Result<Vec<Component>> {
        let components = self.estimator.components(process, region)?;
        if components.is_empty() {
            return Err(Error::EmptyEstimation(format!(
                "no components for process '{}' in region '{}'",
                process.name(),
                region.label()
            )));
        }
        Ok(components)
    }

    fn plain(&self, components: &[Component], ctx: &CallContext<'_>) -> Result<Value> {
        let mut total: Option<Value> = None;
        for c in components {
            let v = self.calc.call_with(&c.process, &c.region, ctx)?;
            if let Value::Uncertainty(_) = v {
                return Err(Error::TypeMismatch(
                    "uncertainties must be estimated with EstimationCalculation::for_uncertainty"
                        .to_string(),
                ));
            }
            total = Some(match total {
                None => multiply(c.coefficient, &v),
                Some(acc) => add(1.0, &acc, c.coefficient, &v)?,
            });
        }
        total.ok_or_else(|| Error::EmptyEstimation("no components".to_string()))
    }

    fn shapes(
        uncertainty: &dyn UncertaintyCalculation,
        component: &Component,
        ctx: &CallContext<'_>,
    ) -> Result<(Value, Value)> {
        let (p, r, c) = (&component.process, &component.region, component.coefficient);
        let nominal = uncertainty.calculation();
        if component.use_nominal {
            let v = multiply(c, &nominal.call_with(p, r, ctx)?);
            return Ok((v.clone(), v));
        }
        let mut u = uncertainty.call_with(p, r, ctx)?.as_uncertainty()?.clone();
        if u.overall_pair().is_some() {
            u = to_shape(&u, &nominal.call_with(p, r, ctx)?);
        }
        match u.shape_pair() {
            Some((up, down)) => Ok((multiply(c, up), multiply(c, down))),
            None => Err(Error::TypeMismatch(format!(
                "uncertainty '{}' has neither overall nor shape components",
                uncertainty.name()
            ))),
        }
    }

    fn summed_shapes(
        &self,
        uncertainty: &dyn UncertaintyCalculation,
        components: &[Component],
        ctx: &CallContext<'_>,
    ) -> Result<Value> {
        let mut total: Option<(Value, Value)> = None;
        for c in components {
            let (up, down) = Self::shapes(uncertainty, c, ctx)?;
            total = Some(match total {
                None => (up, down),
                Some((u, d)) => (add(1.0, &u, 1.0, &up)?, add(1.0, &d, 1.0, &down)?),
            });
        }
        let (up, down) = total.ok_or_else(|| Error::EmptyEstimation("no components".to_string()))?;
        Ok(Value::uncertainty(Uncertainty::shape(up, down)))
    }
}

impl Fingerprinted for EstimationCalculation {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("estimation").nested(&self.estimator).nested(&self.calc);
        fp.bool(self.uncertainty.is_some());
    }
}

impl Calculation for EstimationCalculation {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let components = self.components(process, region)?;
        match &self.uncertainty {
            None => self.plain(&components, ctx),
            Some(u) => self.summed_shapes(u.as_ref(), &components, ctx),
        }
    }
}

impl HigherOrderCalculation for EstimationCalculation {
    fn calculation(&self) -> &Arc<dyn Calculation> {
        &self.calc
    }
}

/// An estimator built from configuration, with the process it estimates.
#[derive(Clone)]
pub struct NamedEstimation {
    /// Record name.
    pub name: String,
    /// Target process, passed to every call of the estimator.
    pub process: Process,
    /// The estimator.
    pub estimator: Arc<dyn Estimator>,
}

/// Builds estimators from the `estimations` section of a configuration.
#[derive(Debug, Clone)]
pub struct EstimationLoader {
    config: Arc<AnalysisConfig>,
    processes: ProcessLoader,
    regions: RegionLoader,
}

impl EstimationLoader {
    /// Loader over `config`.
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        Self {
            processes: ProcessLoader::new(Arc::clone(&config)),
            regions: RegionLoader::new(Arc::clone(&config)),
            config,
        }
    }

    /// Configured names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.config.estimations.keys().map(String::as_str)
    }

    /// Build the named estimation. Referenced processes and regions must
    /// exist; a direct estimation takes no terms and a linear one needs at
    /// least one.
    pub fn load(&self, name: &str) -> Result<NamedEstimation> {
        let c = self
            .config
            .estimations
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown estimation '{}'", name)))?;
        let process = self.processes.load(&c.process)?;
        let estimator: Arc<dyn Estimator> = match c.method {
            EstimationMethod::Direct => {
                if !c.terms.is_empty() {
                    return Err(Error::Config(format!(
                        "direct estimation '{}' takes no terms",
                        name
                    )));
                }
                Arc::new(Direct)
            }
            EstimationMethod::Linear => {
                if c.terms.is_empty() {
                    return Err(Error::Config(format!("linear estimation '{}' has no terms", name)));
                }
                let mut linear = Linear::default();
                for t in &c.terms {
                    let mut term = Term::new(t.coefficient);
                    if let Some(p) = &t.process {
                        term = term.with_process(self.processes.load(p)?);
                    }
                    if let Some(r) = &t.region {
                        term = term.with_region(self.regions.load(r)?);
                    }
                    for f in &t.filters {
                        term = term.varied(Filtered::new(f));
                    }
                    for w in &t.reweights {
                        term = term.varied(Reweighted::new(w));
                    }
                    if t.nominal {
                        term = term.nominal();
                    }
                    linear = linear.with_term(term);
                }
                Arc::new(linear)
            }
        };
        tracing::debug!(estimation = name, process = process.name(), "loaded estimation");
        Ok(NamedEstimation { name: name.to_string(), process, estimator })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::count::Count;
    use crate::uncertainty::{OverallUncertainty, StatisticalUncertainty};
    use approx::assert_relative_eq;
    use tally_data::{MemoryLoader, Table};

    fn loader() -> Arc<MemoryLoader> {
        let a = Table::from_columns([("x", vec![1.0, 2.0, 3.0, -1.0]), ("w", vec![2.0; 4])]).unwrap();
        let b = Table::from_columns([("x", vec![1.0, -2.0]), ("w", vec![0.5, 0.5])]).unwrap();
        Arc::new(MemoryLoader::new().with_tree("a", "nominal", a).with_tree("b", "nominal", b))
    }

    fn setup() -> (Arc<dyn Calculation>, Process, Process, Region) {
        let count: Arc<dyn Calculation> = Arc::new(Count::new(loader()));
        let a = Process::new("A", ["a"], "nominal");
        let b = Process::new("B", ["b"], "nominal");
        (count, a, b, Region::new("x > 0", "w", "R"))
    }

    #[test]
    fn difference_of_counts() {
        let (count, a, b, r) = setup();
        let est = Linear::new(vec![
            Term::new(1.0).with_process(a.clone()),
            Term::new(-1.0).with_process(b.clone()),
        ]);
        let e = EstimationCalculation::new(Arc::new(est), Arc::clone(&count));
        let expected = count.call(&a, &r).unwrap().as_scalar().unwrap()
            - count.call(&b, &r).unwrap().as_scalar().unwrap();
        assert_relative_eq!(e.call(&a, &r).unwrap().as_scalar().unwrap(), expected);
        assert_relative_eq!(expected, 5.5);
    }

    #[test]
    fn direct_is_identity() {
        let (count, a, _, r) = setup();
        let e = EstimationCalculation::new(Arc::new(Direct), Arc::clone(&count));
        assert_eq!(e.call(&a, &r).unwrap(), count.call(&a, &r).unwrap());
    }

    #[test]
    fn empty_estimate_fails() {
        let (count, a, _, r) = setup();
        let none = FnEstimator::new("none", |_: &Process, _: &Region| Ok(Vec::new()));
        let e = EstimationCalculation::new(Arc::new(none), count);
        assert!(matches!(e.call(&a, &r), Err(Error::EmptyEstimation(_))));
    }

    #[test]
    fn terms_vary_regions() {
        let (count, a, _, r) = setup();
        let est = Linear::new(vec![Term::new(1.0).varied(Filtered::new("x < 3"))]);
        let e = EstimationCalculation::new(Arc::new(est), count);
        assert_eq!(e.call(&a, &r).unwrap(), Value::Scalar(4.0));
    }

    #[test]
    fn uncertainty_components_become_scaled_shapes() {
        let (count, a, b, r) = setup();
        let lumi: Arc<dyn UncertaintyCalculation> =
            Arc::new(OverallUncertainty::new("lumi", 1.1, 0.9, Arc::clone(&count)));
        let est = Linear::new(vec![
            Term::new(2.0).with_process(a.clone()),
            Term::new(1.0).with_process(b.clone()).nominal(),
        ]);
        let e = EstimationCalculation::for_uncertainty(Arc::new(est), lumi);
        let v = e.call(&a, &r).unwrap();
        let u = v.as_uncertainty().unwrap();
        assert_eq!(u.overall_pair(), None);
        let (up, down) = u.shape_pair().unwrap();
        // A = 6, B = 0.5
        assert_relative_eq!(up.as_scalar().unwrap(), 2.0 * 6.0 * 1.1 + 0.5);
        assert_relative_eq!(down.as_scalar().unwrap(), 2.0 * 6.0 * 0.9 + 0.5);
    }

    #[test]
    fn plain_estimate_rejects_uncertainties() {
        let (count, a, _, r) = setup();
        let lumi: Arc<dyn Calculation> =
            Arc::new(OverallUncertainty::new("lumi", 1.1, 0.9, Arc::clone(&count)));
        let est = Linear::new(vec![Term::new(2.0), Term::new(1.0)]);
        let e = EstimationCalculation::new(Arc::new(est.clone()), lumi);
        assert!(matches!(e.call(&a, &r), Err(Error::TypeMismatch(_))));

        // The same terms as an uncertainty estimate: shapes relative to A = 6.
        let lumi: Arc<dyn UncertaintyCalculation> =
            Arc::new(OverallUncertainty::new("lumi", 1.1, 0.9, count));
        let v = EstimationCalculation::for_uncertainty(Arc::new(est), lumi).call(&a, &r).unwrap();
        let u = v.as_uncertainty().unwrap();
        assert_eq!(u.overall_pair(), None);
        let (up, down) = u.shape_pair().unwrap();
        assert_relative_eq!(up.as_scalar().unwrap(), 3.0 * 6.0 * 1.1);
        assert_relative_eq!(down.as_scalar().unwrap(), 3.0 * 6.0 * 0.9);
    }

    #[test]
    fn statistical_estimate_sums_shapes() {
        let (count, a, b, r) = setup();
        let stat: Arc<dyn UncertaintyCalculation> = Arc::new(StatisticalUncertainty::new(count));
        let est = Linear::new(vec![
            Term::new(1.0).with_process(a.clone()),
            Term::new(1.0).with_process(b),
        ]);
        let e = EstimationCalculation::for_uncertainty(Arc::new(est), stat);
        let v = e.call(&a, &r).unwrap();
        let (up, _) = v.as_uncertainty().unwrap().shape_pair().unwrap();
        assert_relative_eq!(up.as_scalar().unwrap(), 6.0 + 6.0_f64.sqrt() + 0.5 + 0.5_f64.sqrt());
    }

    const ESTIMATIONS: &str = r#"
processes:
  A: {files: [a]}
  B: {files: [b]}
regions:
  R: {selection: "x > 0", weight: w}
  N: {selection: "x < 0", weight: w}
estimations:
  subtracted:
    process: A
    method: linear
    terms:
      - {coefficient: 1.0}
      - {coefficient: -1.0, process: B}
  transferred:
    process: A
    method: linear
    terms:
      - {coefficient: 0.5, region: N, filters: ["x > -2"]}
  direct:
    process: B
  empty:
    process: A
    method: linear
  bad_region:
    process: A
    method: linear
    terms:
      - {coefficient: 1.0, region: nowhere}
"#;

    #[test]
    fn configured_estimations_evaluate() {
        let (count, _, _, r) = setup();
        let loader = EstimationLoader::new(Arc::new(AnalysisConfig::from_yaml(ESTIMATIONS).unwrap()));
        assert_eq!(
            loader.names().collect::<Vec<_>>(),
            vec!["bad_region", "direct", "empty", "subtracted", "transferred"]
        );

        let eval = |name: &str| {
            let e = loader.load(name).unwrap();
            EstimationCalculation::new(e.estimator, Arc::clone(&count))
                .call(&e.process, &r)
                .unwrap()
                .as_scalar()
                .unwrap()
        };
        assert_relative_eq!(eval("subtracted"), 5.5);
        // A with x < 0 and x > -2: one event of weight 2.
        assert_relative_eq!(eval("transferred"), 1.0);
        assert_relative_eq!(eval("direct"), 0.5);

        assert!(matches!(loader.load("empty"), Err(Error::Config(_))));
        assert!(matches!(loader.load("bad_region"), Err(Error::Config(_))));
        assert!(matches!(loader.load("missing"), Err(Error::Config(_))));
    }

    #[test]
    fn fingerprint_tracks_estimator_and_mode() {
        let (count, _, _, _) = setup();
        let stat: Arc<dyn UncertaintyCalculation> =
            Arc::new(StatisticalUncertainty::new(Arc::clone(&count)));
        let plain = EstimationCalculation::new(Arc::new(Direct), Arc::clone(&count));
        let unc = EstimationCalculation::for_uncertainty(Arc::new(Direct), stat);
        let other = EstimationCalculation::new(Arc::new(Linear::new(vec![Term::new(2.0)])), count);
        assert_ne!(plain.fingerprint(), unc.fingerprint());
        assert_ne!(plain.fingerprint(), other.fingerprint());
    }
}
