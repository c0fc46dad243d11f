//! Error types for Tally

use thiserror::Error;

/// Tally error type
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid binning specification
    #[error("Binning error: {0}")]
    Binning(String),

    /// Value algebra applied to incompatible operands
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Expression could not be parsed or evaluated
    #[error("Expression error: {0}")]
    Expression(String),

    /// Data loading or dataset transformation failed
    #[error("Data error: {0}")]
    Data(String),

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Estimation produced no components
    #[error("Estimation error: {0}")]
    EmptyEstimation(String),

    /// Batch scheduling or execution failure
    #[error("Batch error: {0}")]
    Batch(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
