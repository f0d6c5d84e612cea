//! Aggregation descriptors
//!
//! Describes server-side downsampling: which statistic, over what step, and
//! how gaps are interpolated. Steps are normalized to milliseconds on
//! construction so `2 MINUTE` and `120 SECOND` are the same descriptor.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{FinderError, FinderResult};

/// Statistic computed by ATSD for each period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// Raw samples, no aggregation
    Detail,
    Avg,
    Min,
    Max,
    Sum,
    Count,
    First,
    Last,
    Median,
    StandardDeviation,
    Percentile999,
    Percentile995,
    Percentile99,
    Percentile95,
    Percentile90,
    Percentile75,
    Delta,
    Wavg,
    Wtavg,
    ThresholdCount,
    ThresholdDuration,
    ThresholdPercent,
}

impl Statistic {
    /// All statistics, in display order
    pub fn all() -> &'static [Statistic] {
        &[
            Statistic::Detail,
            Statistic::Avg,
            Statistic::Min,
            Statistic::Max,
            Statistic::Sum,
            Statistic::Count,
            Statistic::First,
            Statistic::Last,
            Statistic::Median,
            Statistic::StandardDeviation,
            Statistic::Percentile999,
            Statistic::Percentile995,
            Statistic::Percentile99,
            Statistic::Percentile95,
            Statistic::Percentile90,
            Statistic::Percentile75,
            Statistic::Delta,
            Statistic::Wavg,
            Statistic::Wtavg,
            Statistic::ThresholdCount,
            Statistic::ThresholdDuration,
            Statistic::ThresholdPercent,
        ]
    }

    /// Name used on the ATSD wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Detail => "DETAIL",
            Statistic::Avg => "AVG",
            Statistic::Min => "MIN",
            Statistic::Max => "MAX",
            Statistic::Sum => "SUM",
            Statistic::Count => "COUNT",
            Statistic::First => "FIRST",
            Statistic::Last => "LAST",
            Statistic::Median => "MEDIAN",
            Statistic::StandardDeviation => "STANDARD_DEVIATION",
            Statistic::Percentile999 => "PERCENTILE_999",
            Statistic::Percentile995 => "PERCENTILE_995",
            Statistic::Percentile99 => "PERCENTILE_99",
            Statistic::Percentile95 => "PERCENTILE_95",
            Statistic::Percentile90 => "PERCENTILE_90",
            Statistic::Percentile75 => "PERCENTILE_75",
            Statistic::Delta => "DELTA",
            Statistic::Wavg => "WAVG",
            Statistic::Wtavg => "WTAVG",
            Statistic::ThresholdCount => "THRESHOLD_COUNT",
            Statistic::ThresholdDuration => "THRESHOLD_DURATION",
            Statistic::ThresholdPercent => "THRESHOLD_PERCENT",
        }
    }

    /// Whether ATSD accepts this statistic in a `group` clause.
    ///
    /// The others only exist as `aggregate` types and are combined with a
    /// `SUM` group when several series must be merged.
    pub fn is_groupable(&self) -> bool {
        !matches!(
            self,
            Statistic::First
                | Statistic::Last
                | Statistic::Delta
                | Statistic::Wavg
                | Statistic::Wtavg
                | Statistic::ThresholdCount
                | Statistic::ThresholdDuration
                | Statistic::ThresholdPercent
        )
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Statistic::all()
            .iter()
            .copied()
            .find(|stat| stat.as_str() == upper)
            .or(match upper.as_str() {
                "AVERAGE" => Some(Statistic::Avg),
                "RAW" => Some(Statistic::Detail),
                _ => None,
            })
            .ok_or_else(|| FinderError::InvalidAggregation(format!("unknown statistic '{}'", s)))
    }
}

/// Unit of an aggregation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    /// Length of one unit in milliseconds
    pub fn millis(&self) -> i64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
            TimeUnit::Week => 604_800_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Millisecond => "MILLISECOND",
            TimeUnit::Second => "SECOND",
            TimeUnit::Minute => "MINUTE",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let singular = match lower.as_str() {
            "ms" => "millisecond",
            "s" => "second",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        match singular {
            "millisecond" => Ok(TimeUnit::Millisecond),
            "second" | "sec" => Ok(TimeUnit::Second),
            "minute" | "min" => Ok(TimeUnit::Minute),
            "hour" | "h" => Ok(TimeUnit::Hour),
            "day" | "d" => Ok(TimeUnit::Day),
            "week" | "w" => Ok(TimeUnit::Week),
            _ => Err(FinderError::InvalidAggregation(format!(
                "unknown time unit '{}'",
                s
            ))),
        }
    }
}

/// Deserialize a `FromStr` type from its string form
fn from_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl<'de> Deserialize<'de> for Statistic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        from_string(deserializer)
    }
}

impl<'de> Deserialize<'de> for TimeUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        from_string(deserializer)
    }
}

/// How ATSD fills periods without samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    None,
    #[default]
    Step,
    Linear,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::None => "NONE",
            Interpolation::Step => "STEP",
            Interpolation::Linear => "LINEAR",
        }
    }
}

impl FromStr for Interpolation {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Interpolation::None),
            "STEP" => Ok(Interpolation::Step),
            "LINEAR" => Ok(Interpolation::Linear),
            _ => Err(FinderError::InvalidAggregation(format!(
                "unknown interpolation '{}'",
                s
            ))),
        }
    }
}

/// Normalized server-side aggregation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregationDescriptor {
    statistic: Statistic,
    /// Step in milliseconds, 0 for detail
    step_ms: i64,
    interpolation: Interpolation,
}

impl AggregationDescriptor {
    /// Create a descriptor, rejecting non-positive steps for real statistics
    pub fn new(statistic: Statistic, count: i64, unit: TimeUnit) -> FinderResult<Self> {
        if statistic == Statistic::Detail {
            if count < 0 {
                return Err(FinderError::InvalidAggregation(format!(
                    "negative step count {}",
                    count
                )));
            }
            return Ok(Self::detail());
        }

        if count <= 0 {
            return Err(FinderError::InvalidAggregation(format!(
                "{} requires a positive step count, got {}",
                statistic, count
            )));
        }

        let step_ms = count.checked_mul(unit.millis()).ok_or_else(|| {
            FinderError::InvalidAggregation(format!("step {} {} overflows", count, unit.as_str()))
        })?;

        Ok(Self {
            statistic,
            step_ms,
            interpolation: Interpolation::default(),
        })
    }

    /// Raw samples
    pub fn detail() -> Self {
        Self {
            statistic: Statistic::Detail,
            step_ms: 0,
            interpolation: Interpolation::default(),
        }
    }

    /// Parse `STAT:COUNT:UNIT` (e.g. `avg:5:minute`) or `detail`
    pub fn parse(spec: &str) -> FinderResult<Self> {
        let parts: Vec<&str> = spec.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [stat] => {
                let statistic: Statistic = stat.parse()?;
                Self::new(statistic, 0, TimeUnit::Second)
            }
            [stat, count, unit] => {
                let statistic: Statistic = stat.parse()?;
                let count: i64 = count.parse().map_err(|_| {
                    FinderError::InvalidAggregation(format!("bad step count '{}'", count))
                })?;
                let unit: TimeUnit = unit.parse()?;
                Self::new(statistic, count, unit)
            }
            _ => Err(FinderError::InvalidAggregation(format!(
                "expected STAT:COUNT:UNIT, got '{}'",
                spec
            ))),
        }
    }

    /// Builder method: set interpolation
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Same step with a different statistic
    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        if statistic == Statistic::Detail {
            return Self::detail();
        }
        if self.statistic != Statistic::Detail {
            self.statistic = statistic;
        }
        self
    }

    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    pub fn is_detail(&self) -> bool {
        self.statistic == Statistic::Detail
    }

    /// Step in whole seconds, if it is a whole number of seconds
    pub fn whole_seconds(&self) -> Option<i64> {
        (self.step_ms > 0 && self.step_ms % 1_000 == 0).then_some(self.step_ms / 1_000)
    }

    /// `(count, unit)` pair as sent to ATSD
    pub fn wire_interval(&self) -> (i64, TimeUnit) {
        match self.whole_seconds() {
            Some(secs) => (secs, TimeUnit::Second),
            None => (self.step_ms, TimeUnit::Millisecond),
        }
    }
}

impl fmt::Display for AggregationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_detail() {
            return f.write_str("DETAIL");
        }
        let (count, unit) = self.wire_interval();
        write!(f, "{} {} {}", self.statistic, count, unit.as_str())
    }
}
