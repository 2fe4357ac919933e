//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! Every variant is fatal: the engine never degrades silently. Numeric edge
//! cases (zero denominators in the R-squared statistics) are not errors and
//! are handled at the call site by returning 0.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for weft operations
#[derive(Error, Debug)]
pub enum WeftError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (invalid parameter values, empty input,
    /// unreadable input files)
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Format errors (malformed emission records)
    #[error("format error at line {line}: {message}")]
    Format { line: u64, message: String },

    /// Cross-component inconsistencies detected at window entry
    #[error("inconsistent data: {message}")]
    Consistency { message: String },

    /// Operations invoked in an invalid state (closed writer, exhausted
    /// window iterator)
    #[error("invalid state: {message}")]
    State { message: String },

    /// File not found errors
    #[error("file not found: {path:?}")]
    FileNotFound { path: PathBuf },
}

/// Type alias for Results using WeftError
pub type Result<T> = std::result::Result<T, WeftError>;

impl WeftError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a format error for the given input line
    pub fn format(line: u64, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }

    /// Create an inconsistent-data error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create an invalid-state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }
}
