// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ramp-preserving hysteresis buffer
//!
//! While the signal sits in a rail zone its samples are held back. Once it
//! leaves, the run is replayed in arrival order: the flat middle snaps to the
//! rail, while the leading edge (until the debounce count is reached) and the
//! trailing ramp window keep their values as read.

use crate::classifier::{Classifier, Zone};
use crate::config::Bounds;
use crate::source::Sample;
use log::{debug, trace};
use std::collections::VecDeque;

/// Buffer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RampState {
    /// Samples pass straight through
    #[default]
    Outside,
    /// Holding an in-zone run
    Buffering,
    /// Replaying a completed run
    Draining,
}

/// A sample released by the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampOutput {
    /// Sample, with its value replaced by the rail if snapped
    pub sample: Sample,
    /// Zone of the value as read
    pub zone: Zone,
    /// Whether the value was replaced
    pub snapped: bool,
}

impl RampOutput {
    fn passthrough(sample: Sample, zone: Zone) -> Self {
        Self {
            sample,
            zone,
            snapped: false,
        }
    }
}

/// Hysteresis buffer with ramp preservation
#[derive(Debug, Clone)]
pub struct RampBuffer {
    classifier: Classifier,
    ramp_fraction: f64,
    state: RampState,
    buffer: VecDeque<Sample>,
    /// Consecutive in-zone samples seen while replaying
    in_bound_iterations: usize,
    ramp_size: usize,
    /// First replay position of the trailing ramp
    ramp_start: usize,
    position: usize,
    zone_entries: u64,
}

impl RampBuffer {
    /// Create a buffer for the given bounds
    pub fn new(bounds: Bounds) -> Self {
        Self {
            classifier: Classifier::new(bounds),
            ramp_fraction: bounds.ramp_fraction,
            state: RampState::Outside,
            buffer: VecDeque::new(),
            in_bound_iterations: 0,
            ramp_size: 0,
            ramp_start: 0,
            position: 0,
            zone_entries: 0,
        }
    }

    /// Feed a fresh sample
    ///
    /// Returns the sample when it passes straight through, `None` when it was
    /// buffered. Callers must empty the buffer with [`next_drained`] while
    /// [`is_draining`] holds; a sample pushed during a drain is queued behind
    /// the run and never snapped.
    ///
    /// [`next_drained`]: RampBuffer::next_drained
    /// [`is_draining`]: RampBuffer::is_draining
    pub fn push(&mut self, sample: Sample) -> Option<RampOutput> {
        let zone = self.classifier.classify(&sample);
        trace!("sample {} at {} is {}", sample.value, sample.timestamp, zone);

        let state = self.state;
        match state {
            RampState::Outside if zone.is_rail() => {
                debug!("entering {} zone at {}", zone, sample.timestamp);
                self.zone_entries += 1;
                self.state = RampState::Buffering;
                self.buffer.push_back(sample);
                None
            }
            RampState::Outside => {
                self.in_bound_iterations = 0;
                Some(RampOutput::passthrough(sample, zone))
            }
            RampState::Buffering if zone.is_rail() => {
                self.buffer.push_back(sample);
                None
            }
            RampState::Buffering => {
                self.close_run();
                self.buffer.push_back(sample);
                None
            }
            RampState::Draining => {
                debug!("sample at {} queued behind an unfinished drain", sample.timestamp);
                self.buffer.push_back(sample);
                None
            }
        }
    }

    /// Replay the next buffered sample, oldest first
    pub fn next_drained(&mut self) -> Option<RampOutput> {
        if self.state != RampState::Draining {
            return None;
        }
        let sample = self.buffer.pop_front()?;
        let position = self.position;
        self.position += 1;
        let output = self.replay(sample, position);

        if self.buffer.is_empty() {
            debug!("drain complete after {} samples", self.position);
            self.state = RampState::Outside;
        }
        Some(output)
    }

    /// Release everything still held, for shutdown
    ///
    /// A run being replayed finishes normally. A run still being buffered is
    /// summarized by its most recent sample: if that sample is in a zone,
    /// the whole run is emitted at its rail, otherwise as read.
    pub fn drain_remaining(&mut self) -> Vec<RampOutput> {
        let state = self.state;
        match state {
            RampState::Outside => Vec::new(),
            RampState::Draining => std::iter::from_fn(|| self.next_drained()).collect(),
            RampState::Buffering => {
                let last_zone = self
                    .buffer
                    .back()
                    .map(|s| self.classifier.classify(s))
                    .unwrap_or(Zone::Outside);
                let rail = self.classifier.rail(last_zone);
                debug!(
                    "shutdown with {} buffered samples, last zone {}",
                    self.buffer.len(),
                    last_zone
                );

                let classifier = &self.classifier;
                let outputs = self
                    .buffer
                    .drain(..)
                    .map(|sample| {
                        let zone = classifier.classify(&sample);
                        match rail {
                            Some(rail) => RampOutput {
                                sample: sample.with_value(rail),
                                zone,
                                snapped: sample.value != rail,
                            },
                            None => RampOutput::passthrough(sample, zone),
                        }
                    })
                    .collect();
                self.state = RampState::Outside;
                outputs
            }
        }
    }

    /// Fix the ramp window of the buffered run and start replaying it
    fn close_run(&mut self) {
        let len = self.buffer.len();
        self.ramp_size = (len as f64 * self.ramp_fraction).floor() as usize;
        self.ramp_start = len.saturating_sub(self.ramp_size);
        self.position = 0;
        self.in_bound_iterations = 0;
        self.state = RampState::Draining;
        debug!(
            "leaving zone after {} samples: ramp size {}, ramp start {}",
            len, self.ramp_size, self.ramp_start
        );
    }

    fn replay(&mut self, sample: Sample, position: usize) -> RampOutput {
        let zone = self.classifier.classify(&sample);
        let Some(rail) = self.classifier.rail(zone) else {
            self.in_bound_iterations = 0;
            return RampOutput::passthrough(sample, zone);
        };

        self.in_bound_iterations += 1;
        if self.in_bound_iterations >= self.ramp_size && position < self.ramp_start {
            RampOutput {
                sample: sample.with_value(rail),
                zone,
                snapped: sample.value != rail,
            }
        } else {
            RampOutput::passthrough(sample, zone)
        }
    }

    /// Current state
    pub fn state(&self) -> RampState {
        self.state
    }

    /// Check if buffered samples are waiting to be replayed
    pub fn is_draining(&self) -> bool {
        self.state == RampState::Draining
    }

    /// Number of samples held
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Ramp size and ramp start of the last closed run
    pub fn ramp_window(&self) -> (usize, usize) {
        (self.ramp_size, self.ramp_start)
    }

    /// Consecutive in-zone samples replayed so far
    pub fn in_bound_iterations(&self) -> usize {
        self.in_bound_iterations
    }

    /// Number of times the signal entered a zone
    pub fn zone_entries(&self) -> u64 {
        self.zone_entries
    }

    /// Get the classifier
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }
}
