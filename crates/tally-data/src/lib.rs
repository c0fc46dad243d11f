//! # tally-data
//!
//! Everything between a data file and a filled measurement:
//!
//! - [`expr`]: selection/weight expressions (string composition and a
//!   compiled evaluator).
//! - [`Table`]: columnar event data.
//! - [`DataLoader`]: reading the named properties of one tree from a set of
//!   locators ([`MemoryLoader`], [`JsonLoader`]).
//! - [`filler`]: weighted counts and single-pass N-dimensional filling.
//! - [`TransientCache`]: a bounded in-memory cache of loaded tables.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expr;
pub mod filler;
pub mod loader;
pub mod table;
pub mod transient;

pub use expr::CompiledExpr;
pub use filler::{FillSpec, count, fill_measurement, fill_measurements};
pub use loader::{DataLoader, JsonLoader, LoadOptions, MemoryLoader};
pub use table::Table;
pub use transient::{TransientCache, TransientCacheConfig, TransientCacheStats};
