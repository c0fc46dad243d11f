//! # tally-core
//!
//! Core types shared by every Tally crate:
//!
//! - [`Error`] / [`Result`]: the error taxonomy surfaced to callers.
//! - [`Fingerprint`]: content hashes used as cache keys.
//! - [`Value`]: the tagged result of a calculation (scalar, binned measurement,
//!   or uncertainty tuple) together with the [`algebra`] that combines them.
//! - [`CacheBackend`]: the get/put contract for durable and in-memory stores.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algebra;
pub mod binning;
pub mod error;
pub mod fingerprint;
pub mod measurement;
pub mod traits;
pub mod value;

pub use algebra::{add, multiply};
pub use binning::Binning;
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintBuilder, Fingerprinted};
pub use measurement::Measurement;
pub use traits::CacheBackend;
pub use value::{Uncertainty, Value, ValueKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
