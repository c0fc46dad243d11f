//! Binned projections of events onto one to three expressions.

use std::collections::BTreeSet;
use std::sync::Arc;

use tally_core::{FingerprintBuilder, Fingerprinted, Measurement, Result, Value};
use tally_data::filler::{FillSpec, fill_measurement};
use tally_data::DataLoader;
use tally_model::{Distribution, Process, Region};

use crate::calculation::{Calculation, Parallelizable};
use crate::context::CallContext;

/// Fills a [`Distribution`] with the events passing a region's selection.
#[derive(Clone)]
pub struct Histogram {
    loader: Arc<dyn DataLoader>,
    distribution: Distribution,
}

impl Histogram {
    /// Histogram `distribution` from events read through `loader`.
    pub fn new(loader: Arc<dyn DataLoader>, distribution: Distribution) -> Self {
        Self { loader, distribution }
    }

    /// The distribution being filled.
    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }
}

impl Fingerprinted for Histogram {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("histogram").nested(&self.distribution);
    }
}

impl Calculation for Histogram {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let properties = ctx.properties_to_load(self.properties(process, region));
        let table = process.load(self.loader.as_ref(), &properties, ctx.transient)?;
        let (selection, weight) = region.selection_weight();
        let spec = FillSpec::new(
            self.distribution.expressions(),
            self.distribution.binnings(),
            &selection,
            &weight,
        )?;
        let m = fill_measurement(&spec, &table)?;
        tracing::debug!(
            process = process.name(),
            region = region.label(),
            distribution = self.distribution.name(),
            integral = m.integral(),
            "filled"
        );
        Ok(Value::Measurement(m))
    }
}

impl Parallelizable for Histogram {
    fn mock(&self, _process: &Process, _region: &Region) -> Result<Value> {
        Ok(Value::Measurement(Measurement::from_binnings(self.distribution.binnings())?))
    }

    fn properties(&self, _process: &Process, region: &Region) -> BTreeSet<String> {
        let mut out = region.properties();
        out.extend(self.distribution.properties());
        out
    }
}
