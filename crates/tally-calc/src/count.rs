//! Weighted event counts.

use std::collections::BTreeSet;
use std::sync::Arc;

use tally_core::{FingerprintBuilder, Fingerprinted, Result, Value};
use tally_data::{DataLoader, filler};
use tally_model::{Process, Region};

use crate::calculation::{Calculation, Parallelizable};
use crate::context::CallContext;

/// Sum of weights of the events passing a region's selection.
#[derive(Clone)]
pub struct Count {
    loader: Arc<dyn DataLoader>,
}

impl Count {
    /// Count events read through `loader`.
    pub fn new(loader: Arc<dyn DataLoader>) -> Self {
        Self { loader }
    }
}

impl Fingerprinted for Count {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("count");
    }
}

impl Calculation for Count {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        let properties = ctx.properties_to_load(region.properties());
        let table = process.load(self.loader.as_ref(), &properties, ctx.transient)?;
        let (selection, weight) = region.selection_weight();
        let n = filler::count(&table, &selection, &weight)?;
        tracing::debug!(process = process.name(), region = region.label(), count = n, "counted");
        Ok(Value::Scalar(n))
    }
}

impl Parallelizable for Count {
    fn mock(&self, _process: &Process, _region: &Region) -> Result<Value> {
        Ok(Value::Scalar(0.0))
    }

    fn properties(&self, _process: &Process, region: &Region) -> BTreeSet<String> {
        region.properties()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_data::{MemoryLoader, Table};

    fn loader() -> Arc<MemoryLoader> {
        let t = Table::from_columns([("x", vec![-1.0, 1.0, 2.0]), ("w", vec![1.0, 2.0, 3.0])])
            .unwrap();
        Arc::new(MemoryLoader::new().with_tree("f", "nominal", t).with_tree_weight("f", 2.0))
    }

    #[test]
    fn counts_selected_weights() {
        let p = Process::new("p", ["f"], "nominal");
        let r = Region::new("x > 0", "w", "R");
        let c = Count::new(loader());
        assert_eq!(c.call(&p, &r).unwrap(), Value::Scalar(5.0));
        assert_eq!(c.call(&p, &r.weighted(false)).unwrap(), Value::Scalar(2.0));
        let tw = Region::new("x > 0", "w * tree_weight", "R");
        assert_eq!(c.call(&p, &tw).unwrap(), Value::Scalar(10.0));
    }

    #[test]
    fn mock_is_zero() {
        let c = Count::new(loader());
        let p = Process::new("p", ["f"], "nominal");
        assert_eq!(c.mock(&p, &Region::new("", "", "")).unwrap(), Value::Scalar(0.0));
    }
}
