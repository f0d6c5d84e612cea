//! Series model
//!
//! Core value types shared by the readers, the batching engine and the
//! regularizer:
//!
//! - **identity**: `{entity, metric, tags}` address of a series
//! - **aggregation**: normalized server-side downsampling descriptors
//! - **regularize**: irregular samples to a fixed-step value array

pub mod aggregation;
pub mod identity;
pub mod regularize;

pub use aggregation::{AggregationDescriptor, Interpolation, Statistic, TimeUnit};
pub use identity::SeriesIdentity;
pub use regularize::regularize;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{FinderError, FinderResult};

/// A time window, `[start, end)` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range, rejecting empty or inverted windows
    pub fn new(start: i64, end: i64) -> FinderResult<Self> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(FinderError::InvalidTimeRange { start, end })
        }
    }

    /// Create a range from unix seconds
    pub fn from_secs(start: f64, end: f64) -> FinderResult<Self> {
        Self::new((start * 1000.0) as i64, (end * 1000.0) as i64)
    }

    /// Create a range for the last N milliseconds from now
    pub fn last_millis(millis: i64) -> Self {
        let end = Utc::now().timestamp_millis();
        Self {
            start: end - millis,
            end,
        }
    }

    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }
}

/// One backend sample; `v` is absent when ATSD reports NaN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub t: i64,
    #[serde(default)]
    pub v: Option<f64>,
}

impl Sample {
    pub fn new(t: i64, v: f64) -> Self {
        Self { t, v: Some(v) }
    }
}

/// Fixed grid of a regularized series, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeInfo {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl TimeInfo {
    /// Number of buckets the grid spans
    pub fn buckets(&self) -> usize {
        if self.step <= 0 {
            return 0;
        }
        usize::try_from((self.end - self.start) / self.step).unwrap_or(0)
    }

    /// Timestamp of bucket `i`, in milliseconds
    pub fn bucket_time(&self, i: usize) -> i64 {
        self.start + i as i64 * self.step
    }

    /// `(start, end, step)` in unix seconds, as Graphite expects
    pub fn as_secs(&self) -> (f64, f64, f64) {
        (
            self.start as f64 / 1000.0,
            self.end as f64 / 1000.0,
            self.step as f64 / 1000.0,
        )
    }
}

/// A regularized series: evenly spaced values, `None` for gaps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesData {
    pub time_info: TimeInfo,
    pub values: Vec<Option<f64>>,
}

impl SeriesData {
    /// `(value, timestamp-seconds)` pairs for Graphite JSON rendering
    pub fn datapoints(&self) -> Vec<(Option<f64>, i64)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (*v, self.time_info.bucket_time(i) / 1000))
            .collect()
    }
}
