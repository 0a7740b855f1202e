//! Bar types and bucket keys
//!
//! A `BarType` is a fixed candle width parsed from labels like `"30s"` or
//! `"1m"`. A `BucketKey` identifies one bucket instance of a bar type and
//! orders monotonically, which is what the aggregator's rollover comparison
//! relies on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::time::NANOS_PER_SEC;

/// Error parsing a bar-type label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BarTypeError {
    #[error("empty bar type label")]
    Empty,

    #[error("bar type `{0}` has no unit suffix (expected s, m, h or d)")]
    MissingUnit(String),

    #[error("bar type `{0}` has a non-numeric magnitude")]
    BadMagnitude(String),

    #[error("bar type `{0}` has zero duration")]
    ZeroDuration(String),
}

/// A fixed candle width, e.g. `"30s"`, `"1m"`, `"4h"`, `"1d"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BarType {
    secs: u32,
}

impl BarType {
    /// Bar width in whole seconds
    pub fn secs(&self) -> u32 {
        self.secs
    }

    /// Bar width in nanoseconds
    pub fn duration_nanos(&self) -> i64 {
        i64::from(self.secs) * NANOS_PER_SEC
    }
}

impl FromStr for BarType {
    type Err = BarTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(unit) = s.chars().last() else {
            return Err(BarTypeError::Empty);
        };
        let per_unit: u32 = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(BarTypeError::MissingUnit(s.to_string())),
        };
        let magnitude = &s[..s.len() - unit.len_utf8()];
        let n: u32 = magnitude
            .parse()
            .map_err(|_| BarTypeError::BadMagnitude(s.to_string()))?;
        if n == 0 {
            return Err(BarTypeError::ZeroDuration(s.to_string()));
        }
        Ok(Self { secs: n * per_unit })
    }
}

impl fmt::Display for BarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Largest unit that divides evenly
        if self.secs % 86_400 == 0 {
            write!(f, "{}d", self.secs / 86_400)
        } else if self.secs % 3600 == 0 {
            write!(f, "{}h", self.secs / 3600)
        } else if self.secs % 60 == 0 {
            write!(f, "{}m", self.secs / 60)
        } else {
            write!(f, "{}s", self.secs)
        }
    }
}

impl TryFrom<String> for BarType {
    type Error = BarTypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BarType> for String {
    fn from(b: BarType) -> Self {
        b.to_string()
    }
}

/// Identifier of one bucket instance of a bar type
///
/// `ts` is the bucket's canonical start time (the tick timestamp floored to
/// the bar duration) and `td` is the bucket generation index. Both grow
/// monotonically with time, and the derived tuple `Ord` is exactly the
/// rollover comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BucketKey {
    /// Bucket generation index (number of whole durations since epoch)
    pub td: i64,
    /// Bucket start time, Unix nanoseconds
    pub ts: i64,
}

impl BucketKey {
    /// Derive the bucket key containing `timestamp_nanos` for `bar_type`
    pub fn from_timestamp(timestamp_nanos: i64, bar_type: BarType) -> Self {
        let dur = bar_type.duration_nanos();
        let td = timestamp_nanos.div_euclid(dur);
        Self { td, ts: td * dur }
    }
}
