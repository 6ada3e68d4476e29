// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the compressor and decompressor

use crate::error::ConfigError;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Rail positions and the tolerance around them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Low rail value
    pub lower: i64,
    /// High rail value
    pub upper: i64,
    /// Half-width of each zone around its rail
    pub offset: i64,
    /// Share of a buffered run kept unsnapped at its trailing edge (0.0-1.0)
    pub ramp_fraction: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            lower: 0,
            upper: 1024,
            offset: 20,
            ramp_fraction: 0.2,
        }
    }
}

impl Bounds {
    /// Create bounds with the default ramp fraction
    pub fn new(lower: i64, upper: i64, offset: i64) -> Self {
        Self {
            lower,
            upper,
            offset,
            ..Default::default()
        }
    }

    /// Set the ramp fraction
    pub fn with_ramp_fraction(mut self, ramp_fraction: f64) -> Self {
        self.ramp_fraction = ramp_fraction;
        self
    }

    /// Closed interval around the low rail
    pub fn low_zone(&self) -> RangeInclusive<i64> {
        self.lower.saturating_sub(self.offset)..=self.lower.saturating_add(self.offset)
    }

    /// Closed interval around the high rail
    pub fn high_zone(&self) -> RangeInclusive<i64> {
        self.upper.saturating_sub(self.offset)..=self.upper.saturating_add(self.offset)
    }

    /// Check the bounds for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offset < 0 {
            return Err(ConfigError::NegativeOffset(self.offset));
        }
        if self.lower > self.upper {
            return Err(ConfigError::InvertedBounds {
                lower: self.lower,
                upper: self.upper,
            });
        }
        let low_end = *self.low_zone().end();
        let high_start = *self.high_zone().start();
        if low_end >= high_start {
            return Err(ConfigError::OverlappingZones {
                low_end,
                high_start,
            });
        }
        if !self.ramp_fraction.is_finite() || !(0.0..=1.0).contains(&self.ramp_fraction) {
            return Err(ConfigError::RampFractionOutOfRange(self.ramp_fraction));
        }
        Ok(())
    }
}

/// How runs of length one are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStyle {
    /// Every run uses the marker form, including single samples
    #[default]
    Unified,
    /// Single samples are written as bare `<value> <timestamp>` lines
    Compact,
}

/// Compressor configuration
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Rails, zone width and ramp fraction
    pub bounds: Bounds,
    /// Largest count a single run record may carry
    pub max_repeats: u32,
    /// Output style for single-sample runs
    pub record_style: RecordStyle,
    /// Pause after the source reports no data
    pub idle_backoff: Duration,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            max_repeats: 5000,
            record_style: RecordStyle::Unified,
            idle_backoff: Duration::from_millis(1),
        }
    }
}

impl CompressorConfig {
    /// Create a configuration with custom bounds
    pub fn with_bounds(bounds: Bounds) -> Self {
        Self {
            bounds,
            ..Default::default()
        }
    }

    /// Set the run cap
    pub fn max_repeats(mut self, max_repeats: u32) -> Self {
        self.max_repeats = max_repeats;
        self
    }

    /// Set the record style
    pub fn record_style(mut self, record_style: RecordStyle) -> Self {
        self.record_style = record_style;
        self
    }

    /// Set the no-data backoff
    pub fn idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Validate the full configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bounds.validate()?;
        if self.max_repeats == 0 {
            return Err(ConfigError::ZeroMaxRepeats);
        }
        Ok(())
    }
}

/// Decompressor configuration
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// `Compact` additionally accepts bare two-field lines
    pub record_style: RecordStyle,
}

impl DecoderConfig {
    /// Create a configuration for the given record style
    pub fn new(record_style: RecordStyle) -> Self {
        Self { record_style }
    }
}
