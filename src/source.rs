// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sample source abstraction module
//!
//! This module provides the capability interface the compressor reads
//! samples through, plus the sources shipped with the crate.

use crate::error::SourceError;
use chrono::{Local, NaiveTime};
use log::debug;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

/// Byte the peripheral bus sends when it has no conversion ready
pub const CONTROL_WORD: u8 = 0xFF;

/// Scale applied to bus bytes to recover the full ADC range
pub const BYTE_SCALE: i64 = 4;

/// A single reading from the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Converter value
    pub value: i64,
    /// Wall-clock time of the read
    pub timestamp: NaiveTime,
}

impl Sample {
    /// Create a new sample
    pub fn new(value: i64, timestamp: NaiveTime) -> Self {
        Self { value, timestamp }
    }

    /// Same sample with its value replaced
    pub fn with_value(self, value: i64) -> Self {
        Self { value, ..self }
    }
}

/// Outcome of one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// A fresh sample
    Sample(Sample),
    /// Nothing new yet, retry after a short pause
    NoData,
    /// Finite source ran out
    Exhausted,
}

/// Trait for sample sources
pub trait SampleSource {
    /// Read the next sample, if any
    fn read(&mut self) -> Result<SourceRead, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read(&mut self) -> Result<SourceRead, SourceError> {
        (**self).read()
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn read(&mut self) -> Result<SourceRead, SourceError> {
        (**self).read()
    }
}

/// Time stamping for sources that do not carry their own timestamps
pub trait Clock {
    /// Current wall-clock time of day
    fn now(&self) -> NaiveTime;
}

/// Local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// A pre-loaded source for testing and in-process replays
#[derive(Debug, Default)]
pub struct MemorySource {
    reads: VecDeque<SourceRead>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that yields the given samples in order
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            reads: samples.into_iter().map(SourceRead::Sample).collect(),
        }
    }

    /// Create a source from bare values, spaced `step` apart starting at `start`
    pub fn from_values(
        values: impl IntoIterator<Item = i64>,
        start: NaiveTime,
        step: chrono::Duration,
    ) -> Self {
        let mut timestamp = start;
        let samples = values.into_iter().map(|value| {
            let sample = Sample::new(value, timestamp);
            timestamp = timestamp + step;
            sample
        });
        Self::from_samples(samples.collect::<Vec<_>>())
    }

    /// Queue a sample
    pub fn push_sample(&mut self, sample: Sample) {
        self.reads.push_back(SourceRead::Sample(sample));
    }

    /// Queue a "no data" poll
    pub fn push_no_data(&mut self) {
        self.reads.push_back(SourceRead::NoData);
    }

    /// Number of queued reads
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    /// Check if all reads were consumed
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

impl SampleSource for MemorySource {
    fn read(&mut self) -> Result<SourceRead, SourceError> {
        Ok(self.reads.pop_front().unwrap_or(SourceRead::Exhausted))
    }
}

/// Byte-per-sample bus framing over any reader (e.g. a spidev node or a pipe)
///
/// Each byte is one conversion scaled by [`BYTE_SCALE`]; [`CONTROL_WORD`]
/// means the bus had nothing ready.
#[derive(Debug)]
pub struct ByteSource<R, C = SystemClock> {
    reader: R,
    clock: C,
}

impl<R: Read> ByteSource<R> {
    /// Create a byte source stamped with the system clock
    pub fn new(reader: R) -> Self {
        Self::with_clock(reader, SystemClock)
    }
}

impl<R: Read, C: Clock> ByteSource<R, C> {
    /// Create a byte source with a custom clock
    pub fn with_clock(reader: R, clock: C) -> Self {
        Self { reader, clock }
    }
}

impl<R: Read, C: Clock> SampleSource for ByteSource<R, C> {
    fn read(&mut self) -> Result<SourceRead, SourceError> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(0) => Ok(SourceRead::Exhausted),
            Ok(_) if byte[0] == CONTROL_WORD => Ok(SourceRead::NoData),
            Ok(_) => Ok(SourceRead::Sample(Sample::new(
                byte[0] as i64 * BYTE_SCALE,
                self.clock.now(),
            ))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(SourceRead::NoData)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads held in flight between the reader thread and the consumer
const THREADED_QUEUE_DEPTH: usize = 1024;

/// Runs a blocking source on its own thread
///
/// [`read`](SampleSource::read) waits at most `poll_timeout` and reports
/// [`SourceRead::NoData`] when nothing arrived, so a consumer polling a
/// shutdown flag stays responsive while the inner source is stuck in a
/// blocking read. The reader thread stops after the inner source is
/// exhausted or fails, or once this handle is dropped and its next read
/// returns. It is never joined.
#[derive(Debug)]
pub struct ThreadedSource {
    rx: Receiver<Result<SourceRead, SourceError>>,
    poll_timeout: Duration,
    finished: bool,
}

impl ThreadedSource {
    /// Move `source` to a reader thread
    pub fn spawn<S>(source: S, poll_timeout: Duration) -> Result<Self, SourceError>
    where
        S: SampleSource + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(THREADED_QUEUE_DEPTH);
        thread::Builder::new()
            .name("snaprun-source".into())
            .spawn(move || pump(source, tx))?;
        Ok(Self {
            rx,
            poll_timeout,
            finished: false,
        })
    }

    /// Maximum wait of a single read
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }
}

fn pump<S: SampleSource>(mut source: S, tx: SyncSender<Result<SourceRead, SourceError>>) {
    loop {
        let read = source.read();
        let last = !matches!(read, Ok(SourceRead::Sample(_)) | Ok(SourceRead::NoData));
        if tx.send(read).is_err() {
            debug!("source consumer gone, stopping reader thread");
            return;
        }
        if last {
            return;
        }
    }
}

impl SampleSource for ThreadedSource {
    fn read(&mut self) -> Result<SourceRead, SourceError> {
        if self.finished {
            return Ok(SourceRead::Exhausted);
        }
        match self.rx.recv_timeout(self.poll_timeout) {
            Ok(Ok(SourceRead::Exhausted)) | Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                Ok(SourceRead::Exhausted)
            }
            Ok(read) => read,
            Err(RecvTimeoutError::Timeout) => Ok(SourceRead::NoData),
        }
    }
}

#[cfg(feature = "random")]
pub use random::RandomSource;

#[cfg(feature = "random")]
mod random {
    use super::{Clock, Sample, SampleSource, SourceRead, SystemClock};
    use crate::config::Bounds;
    use crate::error::SourceError;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Uniform random values between the rails, for dry runs without hardware
    #[derive(Debug)]
    pub struct RandomSource<C = SystemClock> {
        rng: StdRng,
        low: i64,
        high: i64,
        clock: C,
    }

    impl RandomSource {
        /// Values in `[lower, upper + 1]`, seeded from the OS
        pub fn new(bounds: &Bounds) -> Self {
            Self::with_rng(bounds, StdRng::from_entropy(), SystemClock)
        }

        /// Deterministic variant for tests
        pub fn seeded(bounds: &Bounds, seed: u64) -> Self {
            Self::with_rng(bounds, StdRng::seed_from_u64(seed), SystemClock)
        }
    }

    impl<C: Clock> RandomSource<C> {
        /// Create a source with an explicit generator and clock
        pub fn with_rng(bounds: &Bounds, rng: StdRng, clock: C) -> Self {
            Self {
                rng,
                low: bounds.lower,
                high: bounds.upper.saturating_add(1),
                clock,
            }
        }
    }

    impl<C: Clock> SampleSource for RandomSource<C> {
        fn read(&mut self) -> Result<SourceRead, SourceError> {
            let value = self.rng.gen_range(self.low..=self.high);
            Ok(SourceRead::Sample(Sample::new(value, self.clock.now())))
        }
    }
}

#[cfg(feature = "replay")]
pub use replay::ReplaySource;

#[cfg(feature = "replay")]
mod replay {
    use super::{Clock, Sample, SampleSource, SourceRead, SystemClock};
    use crate::error::SourceError;
    use crate::format::parse_timestamp;
    use log::warn;
    use std::fs::File;
    use std::io::Read;
    use std::path::Path;

    /// Replays a capture of `value[,timestamp]` rows
    ///
    /// Rows written by the debug stream (`value timestamp`) are accepted too.
    /// Rows without a timestamp are stamped with the clock.
    pub struct ReplaySource<R, C = SystemClock> {
        rows: csv::StringRecordsIntoIter<R>,
        clock: C,
        row: usize,
    }

    impl ReplaySource<File> {
        /// Open a capture file
        pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
            let file = File::open(path.as_ref()).map_err(|e| SourceError::Unavailable {
                reason: format!("{}: {}", path.as_ref().display(), e),
            })?;
            Ok(Self::new(file))
        }
    }

    impl<R: Read> ReplaySource<R> {
        /// Replay from any reader
        pub fn new(reader: R) -> Self {
            Self::with_clock(reader, SystemClock)
        }
    }

    impl<R: Read, C: Clock> ReplaySource<R, C> {
        /// Replay with a custom clock for rows lacking timestamps
        pub fn with_clock(reader: R, clock: C) -> Self {
            let rows = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(reader)
                .into_records();
            Self {
                rows,
                clock,
                row: 0,
            }
        }

        fn parse_row(&self, record: &csv::StringRecord) -> Option<Sample> {
            let fields: Vec<&str> = if record.len() == 1 {
                record.get(0)?.split_whitespace().collect()
            } else {
                record.iter().collect()
            };
            match fields.as_slice() {
                [value] => Some(Sample::new(value.parse().ok()?, self.clock.now())),
                [value, timestamp] => Some(Sample::new(
                    value.parse().ok()?,
                    parse_timestamp(timestamp)?,
                )),
                _ => None,
            }
        }
    }

    impl<R: Read, C: Clock> SampleSource for ReplaySource<R, C> {
        fn read(&mut self) -> Result<SourceRead, SourceError> {
            loop {
                self.row += 1;
                match self.rows.next() {
                    None => return Ok(SourceRead::Exhausted),
                    Some(Ok(record)) => match self.parse_row(&record) {
                        Some(sample) => return Ok(SourceRead::Sample(sample)),
                        None if record.iter().all(str::is_empty) => continue,
                        None => {
                            warn!("replay row {}: skipping malformed row {:?}", self.row, record)
                        }
                    },
                    Some(Err(err)) => match err.into_kind() {
                        csv::ErrorKind::Io(e) => return Err(e.into()),
                        other => {
                            warn!("replay row {}: skipping unreadable row: {:?}", self.row, other)
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> NaiveTime {
        NaiveTime::from_hms_milli_opt(9, 30, 0, 0).unwrap()
    }

    #[derive(Clone, Copy)]
    struct FixedClock(NaiveTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveTime {
            self.0
        }
    }

    #[test]
    fn test_memory_source_fifo() {
        let mut source =
            MemorySource::from_values([1, 2, 3], t0(), chrono::Duration::milliseconds(10));
        assert_eq!(source.len(), 3);

        let mut values = Vec::new();
        while let SourceRead::Sample(sample) = source.read().unwrap() {
            values.push(sample);
        }
        assert_eq!(
            values.iter().map(|s| s.value).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            values[2].timestamp,
            NaiveTime::from_hms_milli_opt(9, 30, 0, 20).unwrap()
        );
        assert!(source.is_empty());
        assert_eq!(source.read().unwrap(), SourceRead::Exhausted);
    }

    #[test]
    fn test_memory_source_no_data() {
        let mut source = MemorySource::new();
        source.push_no_data();
        source.push_sample(Sample::new(7, t0()));

        assert_eq!(source.read().unwrap(), SourceRead::NoData);
        assert_eq!(
            source.read().unwrap(),
            SourceRead::Sample(Sample::new(7, t0()))
        );
    }

    #[test]
    fn test_byte_source_framing() {
        let bytes: &[u8] = &[0x00, 0xFF, 0x40, 0xFE];
        let mut source = ByteSource::with_clock(bytes, FixedClock(t0()));

        assert_eq!(
            source.read().unwrap(),
            SourceRead::Sample(Sample::new(0, t0()))
        );
        assert_eq!(source.read().unwrap(), SourceRead::NoData);
        assert_eq!(
            source.read().unwrap(),
            SourceRead::Sample(Sample::new(256, t0()))
        );
        assert_eq!(
            source.read().unwrap(),
            SourceRead::Sample(Sample::new(1016, t0()))
        );
        assert_eq!(source.read().unwrap(), SourceRead::Exhausted);
    }

    /// Reader that blocks until the test hands it a byte
    struct GatedReader(mpsc::Receiver<u8>);

    impl Read for GatedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_threaded_source_times_out_while_blocked() {
        let (gate, rx) = mpsc::channel();
        let inner = ByteSource::with_clock(GatedReader(rx), FixedClock(t0()));
        let mut source = ThreadedSource::spawn(inner, Duration::from_millis(5)).unwrap();

        assert_eq!(source.read().unwrap(), SourceRead::NoData);

        gate.send(0x10).unwrap();
        let read = (0..1000)
            .map(|_| source.read().unwrap())
            .find(|read| *read != SourceRead::NoData);
        assert_eq!(read, Some(SourceRead::Sample(Sample::new(64, t0()))));

        drop(gate);
        let read = (0..1000)
            .map(|_| source.read().unwrap())
            .find(|read| *read != SourceRead::NoData);
        assert_eq!(read, Some(SourceRead::Exhausted));
        assert_eq!(source.read().unwrap(), SourceRead::Exhausted);
    }

    #[test]
    fn test_threaded_source_keeps_order() {
        let source = MemorySource::from_values(0..50, t0(), chrono::Duration::milliseconds(1));
        let mut threaded = ThreadedSource::spawn(source, Duration::from_millis(100)).unwrap();

        let mut values = Vec::new();
        loop {
            match threaded.read().unwrap() {
                SourceRead::Sample(sample) => values.push(sample.value),
                SourceRead::NoData => continue,
                SourceRead::Exhausted => break,
            }
        }
        assert_eq!(values, (0..50).collect::<Vec<i64>>());
    }

    #[test]
    fn test_sample_with_value() {
        let sample = Sample::new(13, t0()).with_value(0);
        assert_eq!(sample.value, 0);
        assert_eq!(sample.timestamp, t0());
    }

    #[cfg(feature = "random")]
    #[test]
    fn test_random_source_range() {
        let bounds = crate::config::Bounds::new(0, 1024, 20);
        let mut source = RandomSource::seeded(&bounds, 42);
        for _ in 0..1000 {
            match source.read().unwrap() {
                SourceRead::Sample(sample) => assert!((0..=1025).contains(&sample.value)),
                other => panic!("unexpected read {:?}", other),
            }
        }
    }

    #[cfg(feature = "replay")]
    #[test]
    fn test_replay_source_rows() {
        let capture = "512,10:00:00.000001\n3 10:00:00.000002\n\nnot-a-number\n1020\n";
        let mut source = ReplaySource::with_clock(capture.as_bytes(), FixedClock(t0()));

        let first = source.read().unwrap();
        assert_eq!(
            first,
            SourceRead::Sample(Sample::new(
                512,
                NaiveTime::from_hms_micro_opt(10, 0, 0, 1).unwrap()
            ))
        );
        let second = source.read().unwrap();
        assert_eq!(
            second,
            SourceRead::Sample(Sample::new(
                3,
                NaiveTime::from_hms_micro_opt(10, 0, 0, 2).unwrap()
            ))
        );
        // Malformed row skipped, bare value stamped by the clock
        assert_eq!(
            source.read().unwrap(),
            SourceRead::Sample(Sample::new(1020, t0()))
        );
        assert_eq!(source.read().unwrap(), SourceRead::Exhausted);
    }
}
