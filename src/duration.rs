//! Packed duration values.
//!
//! Duration goals store a single decimal per data point. Under the `minutes` unit the whole part
//! is minutes and the two-digit fraction is seconds (`5.45` is five minutes forty-five seconds),
//! so `.60` through `.99` never occur. Under the `seconds` unit the value is a plain integer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest minute or second component the packed form can carry.
pub const MAX_COMPONENT: u32 = 59;

/// How far a scaled value may sit from a whole hundredth and still count as two-decimal.
const HUNDREDTHS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("{minutes} min {seconds} sec cannot be encoded (each part must be 0-59)")]
    OutOfRange { minutes: u32, seconds: u32 },

    #[error("unknown duration unit '{0}' (expected 'seconds' or 'minutes')")]
    UnknownUnit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Seconds,
    Minutes,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Seconds => "seconds",
            DurationUnit::Minutes => "minutes",
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationUnit {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "sec" | "s" => Ok(DurationUnit::Seconds),
            "minutes" | "minute" | "min" | "m" => Ok(DurationUnit::Minutes),
            other => Err(DurationError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationStyle {
    /// `5:45`
    Clock,
    /// `5 min 45 sec`
    Words,
}

/// A duration split into whole minutes and leftover seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MinutesSeconds {
    pub minutes: u32,
    pub seconds: u32,
}

impl MinutesSeconds {
    pub fn new(minutes: u32, seconds: u32) -> Result<Self, DurationError> {
        if minutes > MAX_COMPONENT || seconds > MAX_COMPONENT {
            return Err(DurationError::OutOfRange { minutes, seconds });
        }
        Ok(Self { minutes, seconds })
    }

    /// Splits a raw second count, carrying every 60 seconds into the minutes part.
    pub fn from_total_seconds(total: u32) -> Result<Self, DurationError> {
        Self::new(total / 60, total % 60)
    }

    pub fn total_seconds(&self) -> u32 {
        self.minutes * 60 + self.seconds
    }

    /// Packed `minutes + seconds / 100` form.
    pub fn encode(&self) -> f64 {
        self.minutes as f64 + self.seconds as f64 / 100.0
    }
}

impl fmt::Display for MinutesSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.minutes, self.seconds)
    }
}

/// Returns the value as a whole number of hundredths, or `None` when it is negative,
/// non-finite, or carries more than two decimal places.
fn exact_hundredths(value: f64) -> Option<u64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let scaled = value * 100.0;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > HUNDREDTHS_TOLERANCE {
        return None;
    }
    Some(rounded as u64)
}

pub fn validate_duration_value(value: f64, unit: DurationUnit) -> bool {
    match unit {
        DurationUnit::Seconds => {
            value.is_finite()
                && value >= 0.0
                && value.fract() == 0.0
                && value <= MAX_COMPONENT as f64
        }
        DurationUnit::Minutes => match exact_hundredths(value) {
            Some(hundredths) => {
                let whole = hundredths / 100;
                let frac = hundredths % 100;
                whole <= MAX_COMPONENT as u64 && frac <= MAX_COMPONENT as u64
            }
            None => false,
        },
    }
}

/// Packs minutes and seconds into the stored decimal. Seconds never roll over into minutes;
/// use [`MinutesSeconds::from_total_seconds`] first when starting from a raw count.
pub fn encode_minutes_seconds(minutes: u32, seconds: u32) -> Result<f64, DurationError> {
    Ok(MinutesSeconds::new(minutes, seconds)?.encode())
}

pub fn decode_to_minutes_seconds(value: f64) -> MinutesSeconds {
    // NaN and negatives decode as zero.
    let hundredths = (value.max(0.0) * 100.0).round() as u64;
    MinutesSeconds {
        minutes: u32::try_from(hundredths / 100).unwrap_or(u32::MAX),
        seconds: (hundredths % 100) as u32,
    }
}

pub fn format_duration(value: f64, style: DurationStyle) -> String {
    let decoded = decode_to_minutes_seconds(value);
    match style {
        DurationStyle::Clock => decoded.to_string(),
        DurationStyle::Words => format!("{} min {} sec", decoded.minutes, decoded.seconds),
    }
}

/// Display form for a stored value under its own unit.
pub fn format_duration_value(value: f64, unit: DurationUnit) -> String {
    match unit {
        DurationUnit::Seconds => format!("{} sec", value.max(0.0).round() as u64),
        DurationUnit::Minutes => format_duration(value, DurationStyle::Clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_covers_every_component_pair() {
        for minutes in 0..=MAX_COMPONENT {
            for seconds in 0..=MAX_COMPONENT {
                let encoded = encode_minutes_seconds(minutes, seconds).unwrap();
                assert_eq!(
                    decode_to_minutes_seconds(encoded),
                    MinutesSeconds { minutes, seconds }
                );
                assert!(validate_duration_value(encoded, DurationUnit::Minutes));
            }
        }
    }

    #[test]
    fn minutes_boundaries() {
        assert!(!validate_duration_value(5.60, DurationUnit::Minutes));
        assert!(validate_duration_value(5.59, DurationUnit::Minutes));
        assert!(validate_duration_value(5.00, DurationUnit::Minutes));
        assert!(validate_duration_value(59.59, DurationUnit::Minutes));
        assert!(!validate_duration_value(60.00, DurationUnit::Minutes));
        assert!(!validate_duration_value(5.75, DurationUnit::Minutes));
        assert!(!validate_duration_value(0.99, DurationUnit::Minutes));
        assert!(validate_duration_value(0.01, DurationUnit::Minutes));
    }

    #[test]
    fn minutes_rejects_sub_hundredth_fractions() {
        assert!(!validate_duration_value(5.005, DurationUnit::Minutes));
        assert!(!validate_duration_value(0.001, DurationUnit::Minutes));
        assert!(!validate_duration_value(12.345, DurationUnit::Minutes));
    }

    #[test]
    fn seconds_boundaries() {
        assert!(validate_duration_value(59.0, DurationUnit::Seconds));
        assert!(validate_duration_value(0.0, DurationUnit::Seconds));
        assert!(!validate_duration_value(60.0, DurationUnit::Seconds));
        assert!(!validate_duration_value(0.5, DurationUnit::Seconds));
    }

    #[test]
    fn negative_and_non_finite_values_are_invalid() {
        for unit in [DurationUnit::Seconds, DurationUnit::Minutes] {
            assert!(!validate_duration_value(-1.0, unit));
            assert!(!validate_duration_value(-0.3, unit));
            assert!(!validate_duration_value(f64::NAN, unit));
            assert!(!validate_duration_value(f64::INFINITY, unit));
        }
    }

    #[test]
    fn encode_refuses_out_of_range_components() {
        assert_eq!(
            encode_minutes_seconds(5, 60),
            Err(DurationError::OutOfRange {
                minutes: 5,
                seconds: 60
            })
        );
        assert!(encode_minutes_seconds(60, 0).is_err());
    }

    #[test]
    fn total_seconds_normalises_before_encoding() {
        let duration = MinutesSeconds::from_total_seconds(345).unwrap();
        assert_eq!(duration, MinutesSeconds { minutes: 5, seconds: 45 });
        assert_eq!(duration.total_seconds(), 345);
        assert!((duration.encode() - 5.45).abs() < 1e-9);
        assert!(MinutesSeconds::from_total_seconds(3600).is_err());
    }

    #[test]
    fn decodes_scenario_values() {
        assert_eq!(decode_to_minutes_seconds(5.45), MinutesSeconds { minutes: 5, seconds: 45 });
        assert_eq!(decode_to_minutes_seconds(3.00), MinutesSeconds { minutes: 3, seconds: 0 });
        assert_eq!(decode_to_minutes_seconds(0.0), MinutesSeconds::default());
    }

    #[test]
    fn formats_clock_and_words() {
        assert_eq!(format_duration(5.45, DurationStyle::Clock), "5:45");
        assert_eq!(format_duration(5.05, DurationStyle::Clock), "5:05");
        assert_eq!(format_duration(0.0, DurationStyle::Clock), "0:00");
        assert_eq!(format_duration(5.45, DurationStyle::Words), "5 min 45 sec");
        assert_eq!(format_duration(12.0, DurationStyle::Words), "12 min 0 sec");
    }

    #[test]
    fn formats_by_unit() {
        assert_eq!(format_duration_value(45.0, DurationUnit::Seconds), "45 sec");
        assert_eq!(format_duration_value(2.3, DurationUnit::Minutes), "2:30");
    }

    #[test]
    fn parses_units() {
        assert_eq!("minutes".parse::<DurationUnit>(), Ok(DurationUnit::Minutes));
        assert_eq!(" Seconds ".parse::<DurationUnit>(), Ok(DurationUnit::Seconds));
        assert!("hours".parse::<DurationUnit>().is_err());
    }
}
