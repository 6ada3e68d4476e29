// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Compressed log format
//!
//! One record per line pair:
//!
//! ```text
//! -R-
//! <count> <value> <timestamp>
//! ```
//!
//! With [`RecordStyle::Compact`] a run of one sample is written as a single
//! bare `<value> <timestamp>` line instead. Timestamps are wall-clock times of
//! day with microseconds; no date is carried, so a capture that crosses
//! midnight cannot be ordered from the log alone.

use crate::config::RecordStyle;
use crate::source::Sample;
use chrono::NaiveTime;
use log::warn;
use std::fmt;
use std::io::{self, Write};

/// Literal line announcing a run record
pub const RUN_MARKER: &str = "-R-";

/// Timestamp layout used when writing
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.6f";

/// Timestamp layout accepted when reading (any fractional precision)
const TIMESTAMP_PARSE_FORMAT: &str = "%H:%M:%S%.f";

/// Render a timestamp the way it appears in every output
pub fn format_timestamp(timestamp: NaiveTime) -> impl fmt::Display {
    timestamp.format(TIMESTAMP_FORMAT)
}

/// Parse a timestamp token
pub fn parse_timestamp(token: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(token, TIMESTAMP_PARSE_FORMAT).ok()
}

/// A run of identical values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRecord {
    /// Number of samples in the run (at least 1)
    pub count: u32,
    /// Value shared by the run
    pub value: i64,
    /// Timestamp of the first sample
    pub start: NaiveTime,
}

impl RunRecord {
    /// Create a new record
    pub fn new(count: u32, value: i64, start: NaiveTime) -> Self {
        Self {
            count,
            value,
            start,
        }
    }
}

/// Formats the data line `<count> <value> <timestamp>`
impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.count,
            self.value,
            format_timestamp(self.start)
        )
    }
}

/// Serializes run records to the primary output
#[derive(Debug)]
pub struct RecordWriter<W> {
    writer: W,
    style: RecordStyle,
    records_written: u64,
    lines_written: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Create a writer
    pub fn new(writer: W, style: RecordStyle) -> Self {
        Self {
            writer,
            style,
            records_written: 0,
            lines_written: 0,
        }
    }

    /// Write one record
    pub fn write_record(&mut self, record: &RunRecord) -> io::Result<()> {
        if self.style == RecordStyle::Compact && record.count == 1 {
            writeln!(
                self.writer,
                "{} {}",
                record.value,
                format_timestamp(record.start)
            )?;
            self.lines_written += 1;
        } else {
            writeln!(self.writer, "{}", RUN_MARKER)?;
            writeln!(self.writer, "{}", record)?;
            self.lines_written += 2;
        }
        self.records_written += 1;
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Number of records written
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Number of lines written
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Get a reference to the underlying writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Best-effort sink for raw samples
///
/// The first failure is logged and disables the sink. Samples offered after
/// that are dropped and counted as failures; nothing reaches the caller.
#[derive(Debug)]
pub struct DebugWriter<W> {
    writer: W,
    failures: u64,
}

impl<W: Write> DebugWriter<W> {
    /// Create a debug writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failures: 0,
        }
    }

    /// Record a raw sample as `<value> <timestamp>`
    pub fn record(&mut self, sample: &Sample) {
        if self.failures > 0 {
            self.failures += 1;
            return;
        }
        let result = writeln!(
            self.writer,
            "{} {}",
            sample.value,
            format_timestamp(sample.timestamp)
        );
        self.note(result);
    }

    /// Flush the underlying writer, unless the sink already failed
    pub fn flush(&mut self) {
        if self.failures > 0 {
            return;
        }
        let result = self.writer.flush();
        self.note(result);
    }

    /// Samples lost to the failure, the failed one included
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn note(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            warn!("debug output failed, continuing without it: {}", e);
            self.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> NaiveTime {
        NaiveTime::from_hms_micro_opt(14, 5, 9, 120).unwrap()
    }

    fn written(style: RecordStyle, records: &[RunRecord]) -> String {
        let mut writer = RecordWriter::new(Vec::new(), style);
        for record in records {
            writer.write_record(record).unwrap();
        }
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(ts()).to_string(), "14:05:09.000120");
        assert_eq!(parse_timestamp("14:05:09.000120"), Some(ts()));
        assert_eq!(
            parse_timestamp("14:05:09.5"),
            NaiveTime::from_hms_milli_opt(14, 5, 9, 500)
        );
        assert_eq!(parse_timestamp("14:05"), None);
        assert_eq!(parse_timestamp("25:00:00.0"), None);
    }

    #[test]
    fn test_unified_style_marks_every_record() {
        let out = written(
            RecordStyle::Unified,
            &[RunRecord::new(1, 512, ts()), RunRecord::new(40, 0, ts())],
        );
        assert_eq!(
            out,
            "-R-\n1 512 14:05:09.000120\n-R-\n40 0 14:05:09.000120\n"
        );
    }

    #[test]
    fn test_compact_style_bare_singles() {
        let out = written(
            RecordStyle::Compact,
            &[RunRecord::new(1, -3, ts()), RunRecord::new(2, 1024, ts())],
        );
        assert_eq!(out, "-3 14:05:09.000120\n-R-\n2 1024 14:05:09.000120\n");
    }

    #[test]
    fn test_writer_counters() {
        let mut writer = RecordWriter::new(Vec::new(), RecordStyle::Compact);
        writer.write_record(&RunRecord::new(1, 1, ts())).unwrap();
        writer.write_record(&RunRecord::new(5, 1, ts())).unwrap();
        assert_eq!(writer.records_written(), 2);
        assert_eq!(writer.lines_written(), 3);
    }

    /// Rejects everything, counting the attempts
    #[derive(Default)]
    struct FailingWriter {
        attempts: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::Other, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::Other, "unplugged"))
        }
    }

    #[test]
    fn test_primary_write_failure_propagates() {
        let mut writer = RecordWriter::new(FailingWriter::default(), RecordStyle::Unified);
        assert!(writer.write_record(&RunRecord::new(1, 1, ts())).is_err());
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn test_debug_writer_stops_after_first_failure() {
        let mut debug = DebugWriter::new(FailingWriter::default());
        debug.record(&Sample::new(3, ts()));
        debug.record(&Sample::new(4, ts()));
        debug.record(&Sample::new(5, ts()));
        debug.flush();
        assert_eq!(debug.failures(), 3);
        assert_eq!(debug.into_inner().attempts, 1);
    }

    #[test]
    fn test_debug_writer_lines() {
        let mut debug = DebugWriter::new(Vec::new());
        debug.record(&Sample::new(17, ts()));
        assert_eq!(
            String::from_utf8(debug.into_inner()).unwrap(),
            "17 14:05:09.000120\n"
        );
    }
}
