//! Decoder module
//!
//! This module parses the compressed log and expands every run back into
//! one line per sample. Only the first sample of a run keeps a timestamp;
//! arrival times of the repeats were not recorded.

use crate::config::{DecoderConfig, RecordStyle};
use crate::error::{FormatError, Result};
use crate::format::{format_timestamp, parse_timestamp, RunRecord, RUN_MARKER};
use chrono::NaiveTime;
use log::warn;
use std::fmt;
use std::io::{self, BufRead, Write};

/// Outcome of feeding one line to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedLine {
    /// A complete record
    Record(RunRecord),
    /// A run marker; the record follows on the next line
    Pending,
    /// Nothing on the line
    Blank,
}

/// Line-at-a-time parser for the compressed format
#[derive(Debug, Clone)]
pub struct RecordParser {
    style: RecordStyle,
    line: usize,
    /// Line number of a marker still waiting for its data line
    marker_line: Option<usize>,
}

impl RecordParser {
    /// Create a parser
    pub fn new(style: RecordStyle) -> Self {
        Self {
            style,
            line: 0,
            marker_line: None,
        }
    }

    /// Parse the next line
    ///
    /// An error means the line (or a dangling marker before it) is skipped;
    /// the parser stays usable.
    pub fn feed(&mut self, line: &str) -> std::result::Result<ParsedLine, FormatError> {
        self.line += 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return Ok(ParsedLine::Blank);
        }

        if trimmed == RUN_MARKER {
            return match self.marker_line.replace(self.line) {
                Some(previous) => Err(FormatError::DanglingMarker { line: previous }),
                None => Ok(ParsedLine::Pending),
            };
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if self.marker_line.take().is_some() {
            return self.parse_run(&fields).map(ParsedLine::Record);
        }

        match fields.len() {
            2 if self.style == RecordStyle::Compact => {
                self.parse_bare(&fields).map(ParsedLine::Record)
            }
            3 => Err(FormatError::MissingMarker { line: self.line }),
            found => Err(FormatError::WrongFieldCount {
                line: self.line,
                expected: self.unmarked_field_count(),
                found,
            }),
        }
    }

    /// Parse the next line from raw bytes
    ///
    /// A line that is not UTF-8 is reported as [`FormatError::InvalidEncoding`]
    /// and also drops a marker waiting for it.
    pub fn feed_bytes(&mut self, line: &[u8]) -> std::result::Result<ParsedLine, FormatError> {
        match std::str::from_utf8(line) {
            Ok(text) => self.feed(text),
            Err(_) => {
                self.line += 1;
                self.marker_line = None;
                Err(FormatError::InvalidEncoding { line: self.line })
            }
        }
    }

    /// Report a marker left open at end of input
    pub fn finish(&mut self) -> Option<FormatError> {
        self.marker_line
            .take()
            .map(|line| FormatError::DanglingMarker { line })
    }

    /// Number of lines fed so far
    pub fn lines_read(&self) -> usize {
        self.line
    }

    fn unmarked_field_count(&self) -> usize {
        match self.style {
            RecordStyle::Compact => 2,
            RecordStyle::Unified => 3,
        }
    }

    fn parse_run(&self, fields: &[&str]) -> std::result::Result<RunRecord, FormatError> {
        let [count, value, timestamp] = fields else {
            return Err(FormatError::WrongFieldCount {
                line: self.line,
                expected: 3,
                found: fields.len(),
            });
        };
        let count = match count.parse::<u32>() {
            Ok(count) if count >= 1 => count,
            _ => {
                return Err(FormatError::InvalidCount {
                    line: self.line,
                    token: count.to_string(),
                })
            }
        };
        Ok(RunRecord::new(
            count,
            self.parse_value(value)?,
            self.parse_time(timestamp)?,
        ))
    }

    fn parse_bare(&self, fields: &[&str]) -> std::result::Result<RunRecord, FormatError> {
        let [value, timestamp] = fields else {
            return Err(FormatError::WrongFieldCount {
                line: self.line,
                expected: 2,
                found: fields.len(),
            });
        };
        Ok(RunRecord::new(
            1,
            self.parse_value(value)?,
            self.parse_time(timestamp)?,
        ))
    }

    fn parse_value(&self, token: &str) -> std::result::Result<i64, FormatError> {
        token.parse().map_err(|_| FormatError::InvalidValue {
            line: self.line,
            token: token.to_string(),
        })
    }

    fn parse_time(&self, token: &str) -> std::result::Result<NaiveTime, FormatError> {
        parse_timestamp(token).ok_or_else(|| FormatError::InvalidTimestamp {
            line: self.line,
            token: token.to_string(),
        })
    }
}

/// One line of decompressed output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedLine {
    /// Sample value
    pub value: i64,
    /// Present only on the first sample of a run
    pub timestamp: Option<NaiveTime>,
}

/// Formats as `value,timestamp` or a bare `value`
impl fmt::Display for ExpandedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(timestamp) => write!(f, "{},{}", self.value, format_timestamp(timestamp)),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Expand a record into its per-sample lines
pub fn expand(record: RunRecord) -> impl Iterator<Item = ExpandedLine> {
    (0..record.count).map(move |i| ExpandedLine {
        value: record.value,
        timestamp: (i == 0).then_some(record.start),
    })
}

/// Statistics from a decompression pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompressionStats {
    /// Records decoded
    pub records: u64,
    /// Output lines produced
    pub lines_written: u64,
    /// Input lines skipped as malformed
    pub lines_skipped: u64,
}

/// Decompressor for snaprun logs
#[derive(Debug, Clone, Default)]
pub struct Decompressor {
    config: DecoderConfig,
}

impl Decompressor {
    /// Create a decompressor for the canonical format
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decompressor with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Stream a compressed log from `reader` into `writer`
    ///
    /// Malformed lines are logged and skipped; only I/O failures abort.
    pub fn expand<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> Result<DecompressionStats> {
        let stats = self.for_each_record(reader.split(b'\n'), |record| {
            for line in expand(*record) {
                writeln!(writer, "{}", line)?;
            }
            Ok(())
        })?;
        writer.flush()?;
        Ok(stats)
    }

    /// Decode every well-formed record of an in-memory log
    pub fn decode_records(&self, input: &str) -> Vec<RunRecord> {
        let mut records = Vec::new();
        let lines = input.lines().map(Ok);
        // In-memory callbacks cannot fail
        let _ = self.for_each_record(lines, |record| {
            records.push(*record);
            Ok(())
        });
        records
    }

    /// Expand an in-memory log
    pub fn expand_records(&self, input: &str) -> Vec<ExpandedLine> {
        self.decode_records(input)
            .into_iter()
            .flat_map(expand)
            .collect()
    }

    fn for_each_record<I, L, F>(&self, lines: I, mut on_record: F) -> Result<DecompressionStats>
    where
        I: Iterator<Item = io::Result<L>>,
        L: AsRef<[u8]>,
        F: FnMut(&RunRecord) -> io::Result<()>,
    {
        let mut parser = RecordParser::new(self.config.record_style);
        let mut stats = DecompressionStats::default();

        for line in lines {
            match parser.feed_bytes(line?.as_ref()) {
                Ok(ParsedLine::Record(record)) => {
                    on_record(&record)?;
                    stats.records += 1;
                    stats.lines_written += record.count as u64;
                }
                Ok(ParsedLine::Pending | ParsedLine::Blank) => {}
                Err(e) => {
                    warn!("skipping malformed record: {}", e);
                    stats.lines_skipped += 1;
                }
            }
        }
        if let Some(e) = parser.finish() {
            warn!("skipping malformed record: {}", e);
            stats.lines_skipped += 1;
        }
        Ok(stats)
    }
}
