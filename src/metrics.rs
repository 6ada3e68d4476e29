//! Metrics collection for compression analysis
//!
//! This module provides statistics about how much of the signal was
//! snapped, how many runs were written, and the resulting ratio.

use crate::classifier::Zone;
use std::collections::HashMap;

/// Compression statistics collector
#[derive(Debug, Clone, Default)]
pub struct CompressionStats {
    /// Samples received from the source
    pub samples_read: u64,
    /// Polls that returned no data
    pub no_data_polls: u64,
    /// Samples whose value was replaced by a rail
    pub samples_snapped: u64,
    /// Times the signal entered a rail zone
    pub zone_entries: u64,
    /// Samples handed to the run-length encoder
    pub samples_encoded: u64,
    /// Run records written
    pub records_written: u64,
    /// Runs split because they reached the cap
    pub cap_splits: u64,
    /// Raw samples lost from the debug stream
    pub debug_write_failures: u64,
    /// Samples per zone as read
    pub zone_distribution: HashMap<Zone, u64>,
}

impl CompressionStats {
    /// Create new stats collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample leaving the ramp buffer
    pub fn record_encoded(&mut self, zone: Zone, snapped: bool) {
        self.samples_encoded += 1;
        if snapped {
            self.samples_snapped += 1;
        }
        *self.zone_distribution.entry(zone).or_insert(0) += 1;
    }

    /// Samples per written record (higher = better)
    pub fn compression_ratio(&self) -> f64 {
        if self.records_written == 0 {
            return 1.0;
        }
        self.samples_encoded as f64 / self.records_written as f64
    }

    /// Share of encoded samples that were snapped (0.0 - 1.0)
    pub fn snap_rate(&self) -> f64 {
        if self.samples_encoded == 0 {
            return 0.0;
        }
        self.samples_snapped as f64 / self.samples_encoded as f64
    }

    /// Reset all stats
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== snaprun compression summary ===\n\n");
        report.push_str(&format!("Samples read: {}\n", self.samples_read));
        report.push_str(&format!("No-data polls: {}\n", self.no_data_polls));
        report.push_str(&format!("Samples encoded: {}\n", self.samples_encoded));
        report.push_str(&format!("Records written: {}\n", self.records_written));
        report.push_str(&format!(
            "Compression ratio: {:.2} samples/record\n",
            self.compression_ratio()
        ));
        report.push_str(&format!(
            "Snapped: {} ({:.1}%)\n",
            self.samples_snapped,
            self.snap_rate() * 100.0
        ));
        report.push_str(&format!("Zone entries: {}\n", self.zone_entries));
        report.push_str(&format!("Cap splits: {}\n", self.cap_splits));

        if !self.zone_distribution.is_empty() {
            report.push_str("\nZone distribution:\n");
            let mut zones: Vec<_> = self.zone_distribution.iter().collect();
            zones.sort_by(|a, b| b.1.cmp(a.1));
            for (zone, count) in zones {
                let percent = (*count as f64 / self.samples_encoded.max(1) as f64) * 100.0;
                report.push_str(&format!("  {}: {} ({:.1}%)\n", zone, count, percent));
            }
        }

        if self.debug_write_failures > 0 {
            report.push_str(&format!(
                "\nDebug write failures: {}\n",
                self.debug_write_failures
            ));
        }

        report
    }
}
