//! Command-line error type

use snaprun::SnaprunError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the `snaprun` binary
#[derive(Error, Debug)]
pub enum CliError {
    /// Input or output file could not be opened
    #[error("Cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The selected source needs an `--input` path
    #[error("Source '{0}' requires --input")]
    MissingInput(&'static str),

    /// Compression or decompression failed
    #[error(transparent)]
    Snaprun(#[from] SnaprunError),

    /// The blocking worker panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CliError {
    /// Wrap an open failure with the offending path
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }
}
