// Copyright 2025 Cowboy AI, LLC.

//! Fixed-point confidence arithmetic
//!
//! Confidence is stored as integer hundredths (scale 2) and only converted
//! to a decimal at persistence and presentation boundaries. All pipeline
//! arithmetic happens on the integer form; the final score is clamped to
//! [0.00, 1.00].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A confidence score in [0.00, 1.00] with scale 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Confidence(u8);

impl Confidence {
    /// The lowest representable confidence, 0.00
    pub const ZERO: Confidence = Confidence(0);
    /// The highest representable confidence, 1.00
    pub const MAX: Confidence = Confidence(100);
    /// Default threshold separating high from low confidence, 0.60
    pub const DEFAULT_THRESHOLD: Confidence = Confidence(60);

    /// Build from hundredths, clamping into [0, 100]
    ///
    /// Raw scoring sums are signed (spam TLDs subtract), so the input is a
    /// signed integer and clamping happens here, at the boundary.
    pub fn from_hundredths_clamped(hundredths: i32) -> Self {
        Confidence(hundredths.clamp(0, 100) as u8)
    }

    /// Build from hundredths, rejecting values outside [0, 100]
    pub fn from_hundredths(hundredths: i32) -> Option<Self> {
        if (0..=100).contains(&hundredths) {
            Some(Confidence(hundredths as u8))
        } else {
            None
        }
    }

    /// Build from a decimal value, rounding half-up to scale 2
    ///
    /// Returns `None` when the rounded value falls outside [0.00, 1.00].
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let hundredths = (value * 100.0 + 0.5).floor() as i64;
        if (0..=100).contains(&hundredths) {
            Some(Confidence(hundredths as u8))
        } else {
            None
        }
    }

    /// The raw hundredths value
    pub fn hundredths(&self) -> u8 {
        self.0
    }

    /// Decimal representation, exact at scale 2
    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Whether this score meets the given threshold
    pub fn meets(&self, threshold: Confidence) -> bool {
        *self >= threshold
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Confidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Confidence::from_f64(value).ok_or_else(|| {
            serde::de::Error::custom(format!("confidence {value} outside [0.00, 1.00]"))
        })
    }
}
