// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sentinel cleansing for raw channel readings.
//!
//! Field devices report a bad reading with a reserved numeric code instead of
//! leaving the slot empty. The sanitizer turns those codes into
//! [`Reading::Missing`] so they never reach the stored history as numbers.

use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;

/// Error codes treated as "no reading" unless configured otherwise.
pub const DEFAULT_SENTINELS: [f64; 3] = [-100.0, -100_000.0, -400_000.0];

/// Text used for [`Reading::Missing`] in the persisted table.
pub const MISSING_TEXT: &str = "nan";

/// A single channel value after sanitization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A measured value.
    Value(f64),
    /// The source reported a sentinel, or sent no value at all.
    Missing,
}

impl Reading {
    /// Returns true for [`Reading::Missing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, Reading::Missing)
    }

    /// Measured value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::Missing => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => write!(f, "{}", v),
            Reading::Missing => f.write_str(MISSING_TEXT),
        }
    }
}

impl FromStr for Reading {
    type Err = ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(MISSING_TEXT) {
            return Ok(Reading::Missing);
        }
        let v: f64 = s.parse()?;
        if v.is_nan() {
            Ok(Reading::Missing)
        } else {
            Ok(Reading::Value(v))
        }
    }
}

/// Maps raw readings to [`Reading`]s using a fixed sentinel set.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitizer {
    sentinels: Vec<f64>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINELS)
    }
}

impl Sanitizer {
    /// Create a sanitizer for the given sentinel codes.
    pub fn new(sentinels: impl IntoIterator<Item = f64>) -> Self {
        Self {
            sentinels: sentinels.into_iter().filter(|s| !s.is_nan()).collect(),
        }
    }

    /// Sentinel codes this sanitizer replaces.
    pub fn sentinels(&self) -> &[f64] {
        &self.sentinels
    }

    /// Returns true if `raw` is numerically equal to a sentinel code.
    pub fn is_sentinel(&self, raw: f64) -> bool {
        self.sentinels.iter().any(|s| *s == raw)
    }

    /// Sanitize one raw reading.
    ///
    /// NaN input is also reported as missing, so a stored `nan` always means
    /// "no reading".
    pub fn sanitize(&self, raw: f64) -> Reading {
        if raw.is_nan() || self.is_sentinel(raw) {
            Reading::Missing
        } else {
            Reading::Value(raw)
        }
    }

    /// Sanitize a sequence of optional raw readings (`None` stays missing).
    pub fn sanitize_all(&self, raw: &[Option<f64>]) -> Vec<Reading> {
        raw.iter()
            .map(|v| v.map_or(Reading::Missing, |v| self.sanitize(v)))
            .collect()
    }
}

/// Sanitize with the default sentinel set.
pub fn sanitize(raw: f64) -> Reading {
    Sanitizer::default().sanitize(raw)
}
