//! The calculation abstraction.

use std::collections::BTreeSet;
use std::sync::Arc;

use tally_core::{Fingerprint, Fingerprinted, Result, Value};
use tally_model::{Process, Region};

use crate::context::CallContext;

/// A computation over a `(process, region)` pair.
///
/// The fingerprint covers the calculation's own output-affecting
/// configuration; together with the process and region fingerprints it
/// identifies a result.
pub trait Calculation: Fingerprinted + Send + Sync {
    /// Compute with an explicit context.
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value>;

    /// Compute without hints or caches.
    fn call(&self, process: &Process, region: &Region) -> Result<Value> {
        self.call_with(process, region, &CallContext::new())
    }
}

/// A calculation wrapping another one.
pub trait HigherOrderCalculation: Calculation {
    /// The wrapped calculation.
    fn calculation(&self) -> &Arc<dyn Calculation>;
}

/// A calculation the batch scheduler can defer and group.
pub trait Parallelizable: Calculation {
    /// A placeholder with the result's shape and zero content.
    fn mock(&self, process: &Process, region: &Region) -> Result<Value>;

    /// Grouping key; calls sharing a key are executed in one batch.
    fn map_key(&self, process: &Process, _region: &Region) -> Fingerprint {
        process.fingerprint()
    }

    /// Columns a call reads, merged into its batch's load hint.
    fn properties(&self, process: &Process, region: &Region) -> BTreeSet<String>;
}

impl<C: Calculation + ?Sized> Calculation for Arc<C> {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        (**self).call_with(process, region, ctx)
    }
}

impl<C: Parallelizable + ?Sized> Parallelizable for Arc<C> {
    fn mock(&self, process: &Process, region: &Region) -> Result<Value> {
        (**self).mock(process, region)
    }

    fn map_key(&self, process: &Process, region: &Region) -> Fingerprint {
        (**self).map_key(process, region)
    }

    fn properties(&self, process: &Process, region: &Region) -> BTreeSet<String> {
        (**self).properties(process, region)
    }
}
