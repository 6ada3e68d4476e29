//! Encoder module
//!
//! This module collapses consecutive identical values into run records,
//! capping every run at a configured length.

use crate::format::RunRecord;
use chrono::NaiveTime;

/// The run currently being accumulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiveRun {
    value: i64,
    count: u32,
    start: NaiveTime,
}

impl LiveRun {
    fn record(&self) -> RunRecord {
        RunRecord::new(self.count, self.value, self.start)
    }
}

/// Run-length encoder
#[derive(Debug, Clone)]
pub struct RunLengthEncoder {
    max_repeats: u32,
    /// `None` until the first value arrives
    current: Option<LiveRun>,
    cap_splits: u64,
}

impl RunLengthEncoder {
    /// Create an encoder; a cap of zero is treated as one
    pub fn new(max_repeats: u32) -> Self {
        Self {
            max_repeats: max_repeats.max(1),
            current: None,
            cap_splits: 0,
        }
    }

    /// Add a value, returning the run it closed, if any
    pub fn push(&mut self, value: i64, timestamp: NaiveTime) -> Option<RunRecord> {
        if let Some(run) = self.current.as_mut() {
            if run.value == value && run.count < self.max_repeats {
                run.count += 1;
                return None;
            }
            if run.value == value {
                self.cap_splits += 1;
            }
        }

        let closed = self.current.map(|run| run.record());
        self.current = Some(LiveRun {
            value,
            count: 1,
            start: timestamp,
        });
        closed
    }

    /// Flush the live run, leaving the encoder empty
    pub fn finish(&mut self) -> Option<RunRecord> {
        self.current.take().map(|run| run.record())
    }

    /// The run being accumulated, not yet emitted
    pub fn pending(&self) -> Option<RunRecord> {
        self.current.map(|run| run.record())
    }

    /// Get the run cap
    pub fn max_repeats(&self) -> u32 {
        self.max_repeats
    }

    /// Number of times a run was split because it reached the cap
    pub fn cap_splits(&self) -> u64 {
        self.cap_splits
    }
}
