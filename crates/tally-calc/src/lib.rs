//! # tally-calc
//!
//! Calculations over `(process, region)` pairs and the machinery composed
//! around them:
//!
//! - [`Calculation`] with the leaf calculations [`Count`] and [`Histogram`].
//! - [`Cached`]: persistent-cache middleware over a [`CacheBackend`](tally_core::CacheBackend)
//!   ([`FileSystemCache`], [`MemoryCache`]).
//! - [`BatchScheduler`] / [`Parallelized`]: capture calls, group them per
//!   data source, load each source once, and execute the groups on a
//!   [`ParallelBackend`].
//! - [`uncertainty`]: systematic and statistical variations; [`band`]:
//!   combining them into count uncertainties and per-bin bands.
//! - [`estimation`]: linear combinations of calculations over several
//!   processes and regions.
//! - [`environment`]: choosing the cache and backend from configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod band;
pub mod batch;
pub mod calculation;
pub mod context;
pub mod count;
pub mod environment;
pub mod estimation;
pub mod histogram;
pub mod persistent;
pub mod uncertainty;

pub use backend::{ParallelBackend, RayonBackend, SerialBackend};
pub use band::{
    Band, combine_count_uncertainties, combine_uncertainty_bands, count_uncertainty,
    count_uncertainty_for, ratio_uncertainty_band, sum_quadrature, to_overall, to_shape,
    uncertainty_band, uncertainty_band_for,
};
pub use batch::{Batch, BatchCall, BatchScheduler, CallOutcome, Parallelized, call_key};
pub use calculation::{Calculation, HigherOrderCalculation, Parallelizable};
pub use context::CallContext;
pub use count::Count;
pub use environment::{BackendConfig, CacheConfig, EnvironmentConfig};
pub use estimation::{
    Component, Direct, EstimationCalculation, EstimationLoader, Estimator, FnEstimator, Linear,
    NamedEstimation, Term,
};
pub use histogram::Histogram;
pub use persistent::{Cached, FileSystemCache, MemoryCache, get_or_compute};
pub use uncertainty::{
    OverallUncertainty, StatisticalUncertainty, TreeUncertainty, UncertaintyCalculation,
    WeightUncertainty,
};
