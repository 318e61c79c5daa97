//! Unified error types for the DHP ecosystem
//!
//! This module provides a common error type [`DhpError`] that can represent
//! errors from any part of the system. Domain-specific error types can be
//! converted to `DhpError` for uniform error handling at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use dhp_core::{DhpError, DhpResult};
//!
//! fn plan_network(path: &str) -> DhpResult<()> {
//!     let config = load_config(path)?;
//!     run_clustering(&config)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all DHP operations.
///
/// This enum provides a common error representation for the DHP ecosystem,
/// allowing errors from I/O, parsing, clustering, and validation to be
/// handled uniformly.
#[derive(Error, Debug)]
pub enum DhpError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Street-graph structure errors
    #[error("Graph error: {0}")]
    Graph(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using DhpError.
pub type DhpResult<T> = Result<T, DhpError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for DhpError {
    fn from(err: anyhow::Error) -> Self {
        DhpError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for DhpError {
    fn from(s: String) -> Self {
        DhpError::Other(s)
    }
}

impl From<&str> for DhpError {
    fn from(s: &str) -> Self {
        DhpError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for DhpError {
    fn from(err: serde_json::Error) -> Self {
        DhpError::Parse(err.to_string())
    }
}
