//! Error types for snaprun
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for snaprun operations
pub type Result<T> = std::result::Result<T, SnaprunError>;

/// Main error type for snaprun operations
#[derive(Error, Debug)]
pub enum SnaprunError {
    /// Invalid configuration (detected before processing starts)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sample source failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Compressed record could not be parsed
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Primary output failure (data would be lost)
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in the compressor configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Offset must be non-negative
    #[error("Bound offset must be non-negative, got {0}")]
    NegativeOffset(i64),

    /// Lower bound above upper bound
    #[error("Lower bound {lower} is above upper bound {upper}")]
    InvertedBounds { lower: i64, upper: i64 },

    /// The low and high zones share at least one value
    #[error("Zones overlap: low zone ends at {low_end}, high zone starts at {high_start}")]
    OverlappingZones { low_end: i64, high_start: i64 },

    /// Ramp fraction outside [0, 1]
    #[error("Ramp fraction must be within [0, 1], got {0}")]
    RampFractionOutOfRange(f64),

    /// A run cap of zero can never hold a sample
    #[error("Maximum repeats must be at least 1")]
    ZeroMaxRepeats,
}

/// Errors raised by sample sources
#[derive(Error, Debug)]
pub enum SourceError {
    /// Underlying device or file failed
    #[error("Read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Source could not be opened or configured
    #[error("Source unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors while parsing a single line of the compressed format
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// Line does not have the expected number of fields
    #[error("Line {line}: expected {expected} fields, found {found}")]
    WrongFieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Run count is not a positive integer
    #[error("Line {line}: invalid run count {token:?}")]
    InvalidCount { line: usize, token: String },

    /// Sample value is not an integer
    #[error("Line {line}: invalid value {token:?}")]
    InvalidValue { line: usize, token: String },

    /// Timestamp is not a wall-clock time
    #[error("Line {line}: invalid timestamp {token:?}")]
    InvalidTimestamp { line: usize, token: String },

    /// Data line without a preceding run marker
    #[error("Line {line}: record is missing its run marker")]
    MissingMarker { line: usize },

    /// Run marker not followed by a data line
    #[error("Line {line}: run marker has no data line")]
    DanglingMarker { line: usize },

    /// Line is not valid UTF-8
    #[error("Line {line}: not valid UTF-8")]
    InvalidEncoding { line: usize },
}

impl FormatError {
    /// Line number (1-based) the error refers to
    pub fn line(&self) -> usize {
        match self {
            FormatError::WrongFieldCount { line, .. }
            | FormatError::InvalidCount { line, .. }
            | FormatError::InvalidValue { line, .. }
            | FormatError::InvalidTimestamp { line, .. }
            | FormatError::MissingMarker { line }
            | FormatError::DanglingMarker { line }
            | FormatError::InvalidEncoding { line } => *line,
        }
    }
}
