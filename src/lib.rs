//! # snaprun - Rail-snapping run-length compression
//!
//! A streaming, lossy compressor for noisy quasi-two-level signals read
//! periodically from an ADC.
//!
//! ## Key Features
//!
//! - **Rail snapping**: noise near the low/high rail collapses to the rail value
//! - **Ramp preservation**: entry and exit edges of a plateau keep their shape
//! - **Capped run-length encoding**: timestamped runs, bounded in length
//! - **Independent decoder**: expands a log back to one line per sample
//!
//! ## Quick Start
//!
//! ```rust
//! use snaprun::{Compressor, CompressorConfig, Decompressor, MemorySource, ShutdownFlag};
//! use chrono::{Duration, NaiveTime};
//!
//! let start = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
//! let mut source = MemorySource::from_values([512, 512, 512], start, Duration::milliseconds(1));
//!
//! let compressor = Compressor::new(CompressorConfig::default(), Vec::new()).unwrap();
//! let report = compressor.run(&mut source, &ShutdownFlag::new()).unwrap();
//! let log = String::from_utf8(report.output).unwrap();
//!
//! let lines = Decompressor::new().expand_records(&log);
//! assert_eq!(lines.len(), 3);
//! assert_eq!(lines[0].timestamp, Some(start));
//! assert!(lines[1].timestamp.is_none());
//! ```
//!
//! ## Modules
//!
//! - [`classifier`]: Zone classification against the rails
//! - [`ramp`]: Hysteresis buffer with ramp preservation
//! - [`encoder`]: Capped run-length encoding
//! - [`format`]: Compressed record format and writers
//! - [`decoder`]: Decompression
//! - [`source`]: Sample source abstraction and implementations
//! - [`pipeline`]: The compression loop
//! - [`metrics`]: Compression statistics

// Modules
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod metrics;
pub mod pipeline;
pub mod ramp;
pub mod source;

// Re-exports for convenient access
pub use classifier::{Classifier, Zone};
pub use config::{Bounds, CompressorConfig, DecoderConfig, RecordStyle};
pub use decoder::{DecompressionStats, Decompressor, ExpandedLine, ParsedLine, RecordParser};
pub use encoder::RunLengthEncoder;
pub use error::{ConfigError, FormatError, Result, SnaprunError, SourceError};
pub use format::{DebugWriter, RecordWriter, RunRecord, RUN_MARKER};
pub use metrics::CompressionStats;
pub use pipeline::{CompressionReport, Compressor, ShutdownFlag, StepOutcome};
pub use ramp::{RampBuffer, RampOutput, RampState};
pub use source::{
    ByteSource, Clock, MemorySource, Sample, SampleSource, SourceRead, SystemClock,
    ThreadedSource,
};

#[cfg(feature = "random")]
pub use source::RandomSource;
#[cfg(feature = "replay")]
pub use source::ReplaySource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
