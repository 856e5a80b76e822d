//! Frame timestamps.
//!
//! A [`Timestamp`] identifies a sampled frame within an episode. Its
//! canonical rendering is `HH:MM:SS.mmm`; every component is zero-padded so
//! that string order agrees with numeric order. Unpadded renderings produced
//! by older pipeline runs are rejected rather than silently accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Invalid {0} value: '{1}'")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS.mmm")]
    InvalidFormat(String),

    #[error("Timestamp '{0}' is not zero-padded (legacy format is not supported)")]
    LegacyFormat(String),
}

/// Position of a frame within an episode.
///
/// Ordering is over the numeric `(hours, minutes, seconds, millis)` tuple.
/// Minutes and seconds are conventionally below 60 but this is not enforced.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub millis: u32,
}

impl Timestamp {
    /// Create a timestamp from its components.
    pub fn new(hours: u32, minutes: u32, seconds: u32, millis: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            millis,
        }
    }

    /// Render with a single delimiter between every component.
    ///
    /// Used for cached frame filenames, e.g. `00_05_12_500`.
    pub fn with_delimiter(&self, delimiter: &str) -> String {
        format!(
            "{:02}{d}{:02}{d}{:02}{d}{:03}",
            self.hours,
            self.minutes,
            self.seconds,
            self.millis,
            d = delimiter
        )
    }

    /// Parse the output of [`Timestamp::with_delimiter`].
    pub fn from_delimited(s: &str, delimiter: &str) -> Result<Self, TimestampError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimestampError::Empty);
        }
        if delimiter.is_empty() {
            return Err(TimestampError::InvalidFormat(s.to_string()));
        }

        let parts: Vec<&str> = s.split(delimiter).collect();
        let [h, m, sec, ms] = parts.as_slice() else {
            return Err(TimestampError::InvalidFormat(s.to_string()));
        };

        let ts = Self::from_parts(h, m, sec, ms)?;
        if ts.with_delimiter(delimiter) != s {
            return Err(TimestampError::LegacyFormat(s.to_string()));
        }
        Ok(ts)
    }

    fn from_parts(h: &str, m: &str, s: &str, ms: &str) -> Result<Self, TimestampError> {
        Ok(Self {
            hours: parse_component("hours", h)?,
            minutes: parse_component("minutes", m)?,
            seconds: parse_component("seconds", s)?,
            millis: parse_component("milliseconds", ms)?,
        })
    }
}

fn parse_component(name: &'static str, value: &str) -> Result<u32, TimestampError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::InvalidValue(name, value.to_string()));
    }
    value
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, value.to_string()))
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            self.hours, self.minutes, self.seconds, self.millis
        )
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimestampError::Empty);
        }

        let parts: Vec<&str> = s.split(':').collect();
        let [h, m, rest] = parts.as_slice() else {
            return Err(TimestampError::InvalidFormat(s.to_string()));
        };
        let Some((sec, ms)) = rest.split_once('.') else {
            return Err(TimestampError::InvalidFormat(s.to_string()));
        };

        let ts = Self::from_parts(h, m, sec, ms)?;
        if ts.to_string() != s {
            return Err(TimestampError::LegacyFormat(s.to_string()));
        }
        Ok(ts)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}
