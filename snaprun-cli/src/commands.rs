// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Subcommand implementations
//!
//! Both commands are synchronous; `main` runs them on a blocking thread so the
//! signal task can flip the shutdown flag while a capture is in progress.

use crate::error::CliError;
use clap::{Args, ValueEnum};
use snaprun::{
    Bounds, ByteSource, CompressionStats, Compressor, CompressorConfig, DecoderConfig,
    DecompressionStats, Decompressor, RandomSource, RecordStyle, ReplaySource, SampleSource,
    ShutdownFlag, SnaprunError, ThreadedSource,
};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Longest a byte-stream read may block before the shutdown flag is checked again
const BYTE_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Where samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Uniform random values across the configured range
    Random,
    /// Peripheral byte stream (0xFF = no data, other bytes scaled by 4)
    Bytes,
    /// Replay a `value[,timestamp]` capture
    Replay,
}

impl SourceKind {
    fn name(self) -> &'static str {
        match self {
            SourceKind::Random => "random",
            SourceKind::Bytes => "bytes",
            SourceKind::Replay => "replay",
        }
    }
}

/// Arguments of `snaprun compress`
#[derive(Args, Debug, Clone)]
pub struct CompressArgs {
    /// Low rail value
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub lower_bound: i64,

    /// High rail value
    #[arg(long, default_value = "1024", allow_hyphen_values = true)]
    pub upper_bound: i64,

    /// Half-width of the zone around each rail
    #[arg(long, default_value = "20", allow_hyphen_values = true)]
    pub bound_offset: i64,

    /// Share of each buffered run kept unsnapped at its exit edge
    #[arg(long, default_value = "0.2")]
    pub ramp_fraction: f64,

    /// Longest run a single record may hold
    #[arg(long, default_value = "5000")]
    pub max_repeats: u32,

    /// Write single-sample runs as bare `<value> <timestamp>` lines
    #[arg(long)]
    pub compact: bool,

    /// Compressed output file
    #[arg(short, long, default_value = "data")]
    pub output: PathBuf,

    /// Also write every raw sample to this file
    #[arg(long)]
    pub debug_output: Option<PathBuf>,

    /// Sample source
    #[arg(long, value_enum, default_value = "random")]
    pub source: SourceKind,

    /// Input for the `bytes` and `replay` sources (`bytes` falls back to stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Pause after a poll that returned no data, in milliseconds
    #[arg(long, default_value = "1")]
    pub idle_backoff_ms: u64,
}

impl CompressArgs {
    /// Build the library configuration from the flags
    pub fn config(&self) -> CompressorConfig {
        let bounds = Bounds::new(self.lower_bound, self.upper_bound, self.bound_offset)
            .with_ramp_fraction(self.ramp_fraction);
        CompressorConfig::with_bounds(bounds)
            .max_repeats(self.max_repeats)
            .record_style(record_style(self.compact))
            .idle_backoff(Duration::from_millis(self.idle_backoff_ms))
    }

    fn open_source(&self, bounds: &Bounds) -> Result<Box<dyn SampleSource + Send>, CliError> {
        match (self.source, self.input.as_deref()) {
            (SourceKind::Random, _) => Ok(Box::new(RandomSource::new(bounds))),
            (SourceKind::Bytes, Some(path)) => {
                threaded(ByteSource::new(BufReader::new(open(path)?)))
            }
            (SourceKind::Bytes, None) => threaded(ByteSource::new(io::stdin())),
            (SourceKind::Replay, Some(path)) => Ok(Box::new(ReplaySource::new(open(path)?))),
            (kind @ SourceKind::Replay, None) => Err(CliError::MissingInput(kind.name())),
        }
    }
}

/// Arguments of `snaprun decompress`
#[derive(Args, Debug, Clone)]
pub struct DecompressArgs {
    /// Compressed log to read
    pub input: PathBuf,

    /// Expanded output file
    pub output: PathBuf,

    /// Accept bare `<value> <timestamp>` lines as single-sample runs
    #[arg(long)]
    pub compact: bool,
}

/// Device and pipe reads can block indefinitely; move them off the capture loop
fn threaded<S>(source: S) -> Result<Box<dyn SampleSource + Send>, CliError>
where
    S: SampleSource + Send + 'static,
{
    let source = ThreadedSource::spawn(source, BYTE_POLL_TIMEOUT).map_err(SnaprunError::from)?;
    Ok(Box::new(source))
}

fn record_style(compact: bool) -> RecordStyle {
    if compact {
        RecordStyle::Compact
    } else {
        RecordStyle::Unified
    }
}

fn open(path: &Path) -> Result<File, CliError> {
    File::open(path).map_err(|e| CliError::open(path, e))
}

fn create(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| CliError::open(path, e))
}

/// Capture samples until the source runs out or `shutdown` is requested
pub fn compress(
    args: &CompressArgs,
    shutdown: &ShutdownFlag,
) -> Result<CompressionStats, CliError> {
    let config = args.config();
    // Reject bad flags before any file is touched
    config.validate().map_err(SnaprunError::from)?;

    let mut source = args.open_source(&config.bounds)?;
    let output = create(&args.output)?;
    info!(
        "compressing from {} source into {}",
        args.source.name(),
        args.output.display()
    );

    let compressor = Compressor::new(config, output)?;
    let stats = match &args.debug_output {
        Some(path) => {
            let debug = create(path)?;
            compressor
                .with_debug_output(debug)
                .run(&mut source, shutdown)?
                .stats
        }
        None => compressor.run(&mut source, shutdown)?.stats,
    };

    info!(
        "wrote {} records for {} samples",
        stats.records_written, stats.samples_encoded
    );
    Ok(stats)
}

/// Expand a compressed log to one line per sample
pub fn decompress(args: &DecompressArgs) -> Result<DecompressionStats, CliError> {
    let reader = BufReader::new(open(&args.input)?);
    let writer = create(&args.output)?;
    let decompressor = Decompressor::with_config(DecoderConfig::new(record_style(args.compact)));

    let stats = decompressor.expand(reader, writer)?;
    info!(
        "expanded {} records into {} lines ({} skipped) at {}",
        stats.records,
        stats.lines_written,
        stats.lines_skipped,
        args.output.display()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn compress_args(dir: &Path) -> CompressArgs {
        CompressArgs {
            lower_bound: 0,
            upper_bound: 1024,
            bound_offset: 20,
            ramp_fraction: 0.2,
            max_repeats: 5000,
            compact: false,
            output: dir.join("data"),
            debug_output: None,
            source: SourceKind::Replay,
            input: None,
            idle_backoff_ms: 0,
        }
    }

    #[test]
    fn test_config_from_flags() {
        let dir = tempdir().unwrap();
        let mut args = compress_args(dir.path());
        args.compact = true;
        args.max_repeats = 7;

        let config = args.config();
        assert_eq!(config.max_repeats, 7);
        assert_eq!(config.record_style, RecordStyle::Compact);
        assert_eq!(config.idle_backoff, Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replay_requires_input() {
        let dir = tempdir().unwrap();
        let args = compress_args(dir.path());
        let err = compress(&args, &ShutdownFlag::new()).unwrap_err();
        assert!(matches!(err, CliError::MissingInput("replay")));
        assert!(!args.output.exists());
    }

    #[test]
    fn test_invalid_flags_touch_nothing() {
        let dir = tempdir().unwrap();
        let mut args = compress_args(dir.path());
        args.bound_offset = -1;
        let err = compress(&args, &ShutdownFlag::new()).unwrap_err();
        assert!(matches!(err, CliError::Snaprun(_)));
        assert!(!args.output.exists());
    }

    #[test]
    fn test_missing_input_file() {
        let dir = tempdir().unwrap();
        let args = DecompressArgs {
            input: dir.path().join("absent"),
            output: dir.path().join("out"),
            compact: false,
        };
        let err = decompress(&args).unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_replay_compress_then_decompress() {
        let dir = tempdir().unwrap();
        let capture = dir.path().join("capture.csv");
        fs::write(
            &capture,
            "512,10:00:00.000000\n512,10:00:00.001000\n512,10:00:00.002000\n700,10:00:00.003000\n",
        )
        .unwrap();

        let mut args = compress_args(dir.path());
        args.input = Some(capture);
        args.debug_output = Some(dir.path().join("debug"));
        let stats = compress(&args, &ShutdownFlag::new()).unwrap();
        assert_eq!(stats.samples_read, 4);
        assert_eq!(stats.records_written, 2);

        let data = fs::read_to_string(dir.path().join("data")).unwrap();
        assert_eq!(
            data,
            "-R-\n3 512 10:00:00.000000\n-R-\n1 700 10:00:00.003000\n"
        );
        let debug = fs::read_to_string(dir.path().join("debug")).unwrap();
        assert_eq!(debug.lines().count(), 4);

        let expanded_path = dir.path().join("expanded");
        let stats = decompress(&DecompressArgs {
            input: dir.path().join("data"),
            output: expanded_path.clone(),
            compact: false,
        })
        .unwrap();
        assert_eq!(stats.lines_written, 4);
        assert_eq!(
            fs::read_to_string(expanded_path).unwrap(),
            "512,10:00:00.000000\n512\n512\n700,10:00:00.003000\n"
        );
    }

    #[test]
    fn test_byte_source_from_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bus.bin");
        fs::write(&input, [0x80u8, 0xFF, 0x80, 0x80]).unwrap();

        let mut args = compress_args(dir.path());
        args.source = SourceKind::Bytes;
        args.input = Some(input);
        let stats = compress(&args, &ShutdownFlag::new()).unwrap();
        assert_eq!(stats.samples_read, 3);
        // The control word, plus any poll that timed out on the reader thread
        assert!(stats.no_data_polls >= 1);
        assert_eq!(stats.records_written, 1);
    }
}
