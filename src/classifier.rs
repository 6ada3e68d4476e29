// snaprun - Rail-snapping run-length compression
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Threshold classification module
//!
//! This module decides whether a sample sits near one of the two rails,
//! where its noise is considered cosmetic, or in between.

use crate::config::Bounds;
use crate::source::Sample;
use std::fmt;

/// Position of a value relative to the rails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    /// Within `[lower - offset, lower + offset]`
    Low,
    /// Within `[upper - offset, upper + offset]`
    High,
    /// Anywhere else
    Outside,
}

impl Zone {
    /// Check if the zone is one of the rails
    pub fn is_rail(&self) -> bool {
        !matches!(self, Zone::Outside)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Low => write!(f, "LOW"),
            Zone::High => write!(f, "HIGH"),
            Zone::Outside => write!(f, "OUTSIDE"),
        }
    }
}

/// Pure classifier over fixed bounds
#[derive(Debug, Clone)]
pub struct Classifier {
    bounds: Bounds,
}

impl Classifier {
    /// Create a classifier for the given bounds
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Classify a raw value
    ///
    /// The low zone is checked first, so a value that satisfies both
    /// intervals (possible only with overlapping zones) is `Low`.
    pub fn zone_of(&self, value: i64) -> Zone {
        if self.bounds.low_zone().contains(&value) {
            Zone::Low
        } else if self.bounds.high_zone().contains(&value) {
            Zone::High
        } else {
            Zone::Outside
        }
    }

    /// Classify a sample
    pub fn classify(&self, sample: &Sample) -> Zone {
        self.zone_of(sample.value)
    }

    /// Rail value a zone snaps to
    pub fn rail(&self, zone: Zone) -> Option<i64> {
        match zone {
            Zone::Low => Some(self.bounds.lower),
            Zone::High => Some(self.bounds.upper),
            Zone::Outside => None,
        }
    }

    /// Get the bounds
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Bounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(Bounds::new(0, 1024, 20))
    }

    #[test]
    fn test_zone_edges_are_inclusive() {
        let c = classifier();
        assert_eq!(c.zone_of(-20), Zone::Low);
        assert_eq!(c.zone_of(20), Zone::Low);
        assert_eq!(c.zone_of(21), Zone::Outside);
        assert_eq!(c.zone_of(-21), Zone::Outside);
        assert_eq!(c.zone_of(1003), Zone::Outside);
        assert_eq!(c.zone_of(1004), Zone::High);
        assert_eq!(c.zone_of(1044), Zone::High);
        assert_eq!(c.zone_of(1045), Zone::Outside);
    }

    #[test]
    fn test_between_rails_is_outside() {
        let c = classifier();
        for value in 21..1004 {
            assert_eq!(c.zone_of(value), Zone::Outside, "value {}", value);
        }
    }

    #[test]
    fn test_overlap_resolves_low() {
        // Misconfigured on purpose: both zones contain 150
        let c = Classifier::new(Bounds::new(100, 200, 60));
        assert_eq!(c.zone_of(150), Zone::Low);
        assert_eq!(c.zone_of(161), Zone::High);
    }

    #[test]
    fn test_rail_values() {
        let c = classifier();
        assert_eq!(c.rail(Zone::Low), Some(0));
        assert_eq!(c.rail(Zone::High), Some(1024));
        assert_eq!(c.rail(Zone::Outside), None);
        assert!(Zone::High.is_rail());
        assert!(!Zone::Outside.is_rail());
    }

    #[test]
    fn test_classify_sample() {
        let c = classifier();
        let sample = Sample::new(1030, chrono::NaiveTime::from_hms_opt(1, 2, 3).unwrap());
        assert_eq!(c.classify(&sample), Zone::High);
        assert_eq!(format!("{}", c.classify(&sample)), "HIGH");
    }
}
