//! Error types for massfit

use thiserror::Error;

/// massfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input (bad bounds, inconsistent datasets, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Numerical failure during evaluation or minimization
    #[error("Computation error: {0}")]
    Computation(String),

    /// Lookup of a named workspace object failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Factory expression could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
