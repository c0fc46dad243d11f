//! # tally-model
//!
//! The analysis vocabulary: [`Region`] (selection + weight, varied by
//! [`Variation`]s), [`Process`] (data sources + [`Patch`]es), and
//! [`Distribution`] (what to histogram). All three are immutable values;
//! modifiers return new values. Their fingerprints cover only
//! output-affecting fields, so cosmetic changes never invalidate caches.
//!
//! [`config`] loads all three from YAML, along with the estimation records
//! that combine them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod distribution;
pub mod process;
pub mod region;

pub use config::{
    AnalysisConfig, DistributionLoader, EstimationConfig, EstimationMethod, ProcessLoader,
    RegionLoader, TermConfig, load_config,
};
pub use distribution::Distribution;
pub use process::{Defined, Patch, Process, TREE_WEIGHT_PROPERTY};
pub use region::{Filtered, Region, Reweighted, Variation};
