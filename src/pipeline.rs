// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Compression pipeline
//!
//! Wires source, ramp buffer, run-length encoder and record writer into a
//! single-threaded loop with cooperative shutdown.

use crate::config::CompressorConfig;
use crate::encoder::RunLengthEncoder;
use crate::error::Result;
use crate::format::{DebugWriter, RecordWriter, RunRecord};
use crate::metrics::CompressionStats;
use crate::ramp::{RampBuffer, RampOutput, RampState};
use crate::source::{Sample, SampleSource, SourceRead};
use log::{debug, info, trace};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Cooperative cancellation flag, polled once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Create a cleared flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pipeline to drain and stop
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether shutdown was requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a single loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Replayed one buffered sample
    Drained,
    /// Read and processed a fresh sample
    Processed,
    /// Source had nothing; backed off
    Idle,
    /// Source has no more samples
    Exhausted,
}

/// Everything a finished compressor hands back
#[derive(Debug)]
pub struct CompressionReport<W, D> {
    /// Final statistics
    pub stats: CompressionStats,
    /// Primary output, flushed
    pub output: W,
    /// Debug output, if one was attached
    pub debug: Option<D>,
}

/// Streaming compressor
#[derive(Debug)]
pub struct Compressor<W, D = io::Sink> {
    config: CompressorConfig,
    ramp: RampBuffer,
    encoder: RunLengthEncoder,
    writer: RecordWriter<W>,
    debug: Option<DebugWriter<D>>,
    stats: CompressionStats,
}

impl<W: Write> Compressor<W> {
    /// Create a compressor writing to `output`
    ///
    /// Fails if the configuration is invalid; nothing is written in that case.
    pub fn new(config: CompressorConfig, output: W) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ramp: RampBuffer::new(config.bounds),
            encoder: RunLengthEncoder::new(config.max_repeats),
            writer: RecordWriter::new(output, config.record_style),
            debug: None,
            stats: CompressionStats::new(),
            config,
        })
    }
}

impl<W: Write, D: Write> Compressor<W, D> {
    /// Attach a debug stream receiving every raw sample
    pub fn with_debug_output<D2: Write>(self, debug: D2) -> Compressor<W, D2> {
        Compressor {
            config: self.config,
            ramp: self.ramp,
            encoder: self.encoder,
            writer: self.writer,
            debug: Some(DebugWriter::new(debug)),
            stats: self.stats,
        }
    }

    /// Push one sample through the pipeline
    ///
    /// Any replay still pending is finished first so output order matches
    /// arrival order.
    pub fn process(&mut self, sample: Sample) -> Result<()> {
        self.stats.samples_read += 1;
        if let Some(debug) = self.debug.as_mut() {
            debug.record(&sample);
        }

        while let Some(output) = self.ramp.next_drained() {
            self.encode(output)?;
        }
        if let Some(output) = self.ramp.push(sample) {
            self.encode(output)?;
        }
        Ok(())
    }

    /// Run one loop iteration against `source`
    pub fn step<S: SampleSource + ?Sized>(&mut self, source: &mut S) -> Result<StepOutcome> {
        if let Some(output) = self.ramp.next_drained() {
            self.encode(output)?;
            return Ok(StepOutcome::Drained);
        }

        match source.read()? {
            SourceRead::Sample(sample) => {
                self.process(sample)?;
                Ok(StepOutcome::Processed)
            }
            SourceRead::NoData => {
                self.stats.no_data_polls += 1;
                thread::sleep(self.config.idle_backoff);
                Ok(StepOutcome::Idle)
            }
            SourceRead::Exhausted => Ok(StepOutcome::Exhausted),
        }
    }

    /// Loop until shutdown is requested or the source runs out, then finish
    pub fn run<S: SampleSource + ?Sized>(
        mut self,
        source: &mut S,
        shutdown: &ShutdownFlag,
    ) -> Result<CompressionReport<W, D>> {
        loop {
            if shutdown.is_requested() {
                info!("shutdown requested, draining");
                break;
            }
            if self.step(source)? == StepOutcome::Exhausted {
                info!("source exhausted, draining");
                break;
            }
        }
        self.finish()
    }

    /// Drain the ramp buffer, flush the live run and release the outputs
    pub fn finish(mut self) -> Result<CompressionReport<W, D>> {
        for output in self.ramp.drain_remaining() {
            self.encode(output)?;
        }
        if let Some(record) = self.encoder.finish() {
            self.write(record)?;
        }
        self.writer.flush()?;

        self.stats.cap_splits = self.encoder.cap_splits();
        self.stats.zone_entries = self.ramp.zone_entries();
        if let Some(debug) = self.debug.as_mut() {
            debug.flush();
            self.stats.debug_write_failures = debug.failures();
        }

        info!(
            "compressed {} samples into {} records ({:.2} samples/record)",
            self.stats.samples_encoded,
            self.stats.records_written,
            self.stats.compression_ratio()
        );
        debug!("{}", self.stats.report());

        Ok(CompressionReport {
            stats: self.stats,
            output: self.writer.into_inner(),
            debug: self.debug.map(DebugWriter::into_inner),
        })
    }

    fn encode(&mut self, output: RampOutput) -> Result<()> {
        self.stats.record_encoded(output.zone, output.snapped);
        if let Some(record) = self
            .encoder
            .push(output.sample.value, output.sample.timestamp)
        {
            self.write(record)?;
        }
        Ok(())
    }

    fn write(&mut self, record: RunRecord) -> Result<()> {
        trace!("record {}", record);
        self.writer.write_record(&record)?;
        self.stats.records_written += 1;
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Statistics so far
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// State of the ramp buffer
    pub fn ramp_state(&self) -> RampState {
        self.ramp.state()
    }

    /// Run not yet written
    pub fn pending_run(&self) -> Option<RunRecord> {
        self.encoder.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bounds;
    use crate::error::{ConfigError, SnaprunError};
    use crate::source::MemorySource;
    use chrono::NaiveTime;

    fn start() -> NaiveTime {
        NaiveTime::from_hms_opt(6, 0, 0).unwrap()
    }

    fn source(values: &[i64]) -> MemorySource {
        MemorySource::from_values(
            values.iter().copied(),
            start(),
            chrono::Duration::milliseconds(1),
        )
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CompressorConfig::with_bounds(Bounds::new(0, 30, 20));
        let err = Compressor::new(config, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            SnaprunError::Config(ConfigError::OverlappingZones { .. })
        ));
    }

    #[test]
    fn test_step_outcomes() {
        let mut compressor = Compressor::new(
            CompressorConfig::default().idle_backoff(std::time::Duration::ZERO),
            Vec::new(),
        )
        .unwrap();
        let mut src = MemorySource::new();
        src.push_sample(Sample::new(3, start()));
        src.push_no_data();
        src.push_sample(Sample::new(500, start()));

        assert_eq!(compressor.step(&mut src).unwrap(), StepOutcome::Processed);
        assert_eq!(compressor.ramp_state(), RampState::Buffering);
        assert_eq!(compressor.step(&mut src).unwrap(), StepOutcome::Idle);
        assert_eq!(compressor.step(&mut src).unwrap(), StepOutcome::Processed);
        assert_eq!(compressor.ramp_state(), RampState::Draining);
        assert_eq!(compressor.step(&mut src).unwrap(), StepOutcome::Drained);
        assert_eq!(compressor.step(&mut src).unwrap(), StepOutcome::Drained);
        assert_eq!(compressor.step(&mut src).unwrap(), StepOutcome::Exhausted);
        assert_eq!(compressor.stats().no_data_polls, 1);
    }

    #[test]
    fn test_run_until_exhausted() {
        let compressor = Compressor::new(CompressorConfig::default(), Vec::new()).unwrap();
        let report = compressor
            .run(&mut source(&[500, 500, 500]), &ShutdownFlag::new())
            .unwrap();
        assert_eq!(
            String::from_utf8(report.output).unwrap(),
            "-R-\n3 500 06:00:00.000000\n"
        );
        assert_eq!(report.stats.records_written, 1);
        assert!(report.debug.is_none());
    }

    #[test]
    fn test_shutdown_flag_stops_before_reading() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();
        flag.request();
        assert!(observer.is_requested());

        let mut src = source(&[1, 2, 3]);
        let compressor = Compressor::new(CompressorConfig::default(), Vec::new()).unwrap();
        let report = compressor.run(&mut src, &flag).unwrap();
        assert!(report.output.is_empty());
        assert_eq!(src.len(), 3);
    }

    #[test]
    fn test_debug_stream_gets_raw_values() {
        let compressor = Compressor::new(CompressorConfig::default(), Vec::new())
            .unwrap()
            .with_debug_output(Vec::new());
        let report = compressor
            .run(&mut source(&[7, 3, 900]), &ShutdownFlag::new())
            .unwrap();

        let debug = String::from_utf8(report.debug.unwrap()).unwrap();
        assert_eq!(
            debug,
            "7 06:00:00.000000\n3 06:00:00.001000\n900 06:00:00.002000\n"
        );
    }

    struct UnpluggedSink;

    impl Write for UnpluggedSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    #[test]
    fn test_failing_debug_sink_keeps_primary_log() {
        let compressor = Compressor::new(CompressorConfig::default(), Vec::new())
            .unwrap()
            .with_debug_output(UnpluggedSink);
        let report = compressor
            .run(&mut source(&[500, 500, 700, 10]), &ShutdownFlag::new())
            .unwrap();

        let expected = concat!(
            "-R-\n2 500 06:00:00.000000\n",
            "-R-\n1 700 06:00:00.002000\n",
            "-R-\n1 0 06:00:00.003000\n",
        );
        assert_eq!(String::from_utf8(report.output).unwrap(), expected);
        assert_eq!(report.stats.samples_encoded, 4);
        assert_eq!(report.stats.debug_write_failures, 4);
    }

    #[test]
    fn test_process_drains_before_pushing() {
        let config = CompressorConfig::with_bounds(Bounds::default().with_ramp_fraction(0.0));
        let mut compressor = Compressor::new(config, Vec::new()).unwrap();
        let t = start();
        compressor.process(Sample::new(5, t)).unwrap();
        compressor.process(Sample::new(600, t)).unwrap();
        compressor.process(Sample::new(600, t)).unwrap();

        let report = compressor.finish().unwrap();
        assert_eq!(
            String::from_utf8(report.output).unwrap(),
            "-R-\n1 0 06:00:00.000000\n-R-\n2 600 06:00:00.000000\n"
        );
        assert_eq!(report.stats.samples_snapped, 1);
        assert_eq!(report.stats.zone_entries, 1);
    }
}
