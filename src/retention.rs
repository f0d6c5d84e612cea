//! Retention / Aggregation Policy
//!
//! Picks the server-side aggregation for a fetch from the look-back span it
//! covers. Each `[[retention]]` section lists tiers of
//! `(max_age, aggregation)`; the first section whose metric glob matches is
//! used.
//!
//! ```toml
//! [[retention]]
//! metric = "cpu_*"
//! tiers = [
//!     { max_age = "1h" },
//!     { max_age = "1d", aggregation = "avg:60:second" },
//!     { aggregation = "avg:1:hour" },
//! ]
//! ```
//!
//! A tier without `max_age` is unbounded; a tier without `aggregation` means
//! raw samples.

use regex::Regex;
use serde::Deserialize;

use crate::error::{FinderError, FinderResult};
use crate::series::{AggregationDescriptor, TimeUnit};

/// One `[[retention]]` section as written in the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionSectionConfig {
    /// Metric-name glob; absent matches every metric
    #[serde(default)]
    pub metric: Option<String>,

    #[serde(default)]
    pub tiers: Vec<RetentionTierConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionTierConfig {
    /// Age such as `"1h"`, `"30m"`, `"7d"`; absent or `"inf"` is unbounded
    #[serde(default)]
    pub max_age: Option<String>,

    /// `STAT:COUNT:UNIT`; absent means raw samples
    #[serde(default)]
    pub aggregation: Option<String>,
}

/// A parsed tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionTier {
    /// Milliseconds, `None` when unbounded
    pub max_age_ms: Option<i64>,
    pub aggregation: Option<AggregationDescriptor>,
}

#[derive(Debug, Clone)]
struct RetentionSection {
    metric: Option<glob::Pattern>,
    tiers: Vec<RetentionTier>,
}

impl RetentionSection {
    fn applies_to(&self, metric: &str) -> bool {
        self.metric.as_ref().map_or(true, |p| p.matches(metric))
    }
}

/// Read-only retention rule table
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    sections: Vec<RetentionSection>,
}

impl RetentionPolicy {
    /// A policy that always selects raw samples
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the table from config sections, skipping malformed ones
    pub fn from_config(sections: &[RetentionSectionConfig]) -> Self {
        let sections = sections
            .iter()
            .enumerate()
            .filter_map(|(i, section)| match parse_section(section) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!(section = i, error = %e, "Skipping retention section");
                    None
                }
            })
            .collect();

        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Tiers of the first section matching `metric`
    pub fn tiers_for(&self, metric: &str) -> Option<&[RetentionTier]> {
        self.sections
            .iter()
            .find(|s| s.applies_to(metric))
            .map(|s| s.tiers.as_slice())
    }

    /// Select the aggregation for a fetch of `metric` over `[start, end)`.
    ///
    /// Returns the tier with the most recent cutoff (`end - max_age`) that is
    /// still at or before `start`, or the coarsest tier when none is. `None`
    /// means raw samples. `explicit_interval` (ms) replaces `start` with
    /// `end - explicit_interval`.
    pub fn select(
        &self,
        metric: &str,
        end: i64,
        start: i64,
        explicit_interval: Option<i64>,
    ) -> Option<AggregationDescriptor> {
        let tiers = self.tiers_for(metric)?;
        let start = explicit_interval.map_or(start, |interval| end - interval);

        let mut cutoffs: Vec<(i64, Option<AggregationDescriptor>)> = tiers
            .iter()
            .map(|tier| {
                let cutoff = tier
                    .max_age_ms
                    .map_or(i64::MIN, |age| end.saturating_sub(age));
                (cutoff, tier.aggregation)
            })
            .collect();
        cutoffs.sort_by(|a, b| b.0.cmp(&a.0));

        let chosen = cutoffs
            .iter()
            .find(|(cutoff, _)| *cutoff <= start)
            .or_else(|| cutoffs.last())?;

        tracing::trace!(metric, start, end, aggregation = ?chosen.1, "Retention tier selected");
        chosen.1
    }
}

fn parse_section(section: &RetentionSectionConfig) -> FinderResult<RetentionSection> {
    let metric = section
        .metric
        .as_deref()
        .map(|glob| {
            glob::Pattern::new(glob)
                .map_err(|e| FinderError::Config(format!("bad metric glob '{}': {}", glob, e)))
        })
        .transpose()?;

    if section.tiers.is_empty() {
        return Err(FinderError::Config("section has no tiers".to_string()));
    }

    let tiers = section
        .tiers
        .iter()
        .map(|tier| -> FinderResult<RetentionTier> {
            let max_age_ms = tier.max_age.as_deref().map(parse_age).transpose()?.flatten();
            let aggregation = tier
                .aggregation
                .as_deref()
                .map(AggregationDescriptor::parse)
                .transpose()
                .map_err(|e| FinderError::Config(e.to_string()))?
                .filter(|agg| !agg.is_detail());
            Ok(RetentionTier {
                max_age_ms,
                aggregation,
            })
        })
        .collect::<FinderResult<Vec<RetentionTier>>>()?;

    Ok(RetentionSection { metric, tiers })
}

/// Parse an age like `"90s"`, `"30m"`, `"1h"`, `"7d"`; `"inf"` is unbounded
pub fn parse_age(s: &str) -> FinderResult<Option<i64>> {
    let s = s.trim().to_ascii_lowercase();
    if s == "inf" || s == "infinity" {
        return Ok(None);
    }

    let re = Regex::new(r"^(\d+)\s*([a-z]*)$")
        .map_err(|e| FinderError::Config(format!("age pattern: {}", e)))?;
    let caps = re
        .captures(&s)
        .ok_or_else(|| FinderError::Config(format!("invalid age '{}'", s)))?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| FinderError::Config(format!("invalid age '{}'", s)))?;
    let unit = match &caps[2] {
        "" => TimeUnit::Second,
        "m" => TimeUnit::Minute,
        other => other
            .parse::<TimeUnit>()
            .map_err(|_| FinderError::Config(format!("invalid age unit in '{}'", s)))?,
    };

    amount
        .checked_mul(unit.millis())
        .map(Some)
        .ok_or_else(|| FinderError::Config(format!("age '{}' overflows", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Statistic;

    const HOUR: i64 = 3_600_000;
    const DAY: i64 = 24 * HOUR;
    const NOW: i64 = 1_700_000_000_000;

    fn tier(max_age: Option<&str>, aggregation: Option<&str>) -> RetentionTierConfig {
        RetentionTierConfig {
            max_age: max_age.map(String::from),
            aggregation: aggregation.map(String::from),
        }
    }

    fn three_tier_policy() -> RetentionPolicy {
        RetentionPolicy::from_config(&[RetentionSectionConfig {
            metric: None,
            tiers: vec![
                tier(Some("1h"), None),
                tier(Some("1d"), Some("avg:60:second")),
                tier(None, Some("avg:3600:second")),
            ],
        }])
    }

    fn step_of(agg: Option<AggregationDescriptor>) -> Option<i64> {
        agg.map(|a| a.step_ms())
    }

    #[test]
    fn test_two_hour_window_selects_minute_tier() {
        let policy = three_tier_policy();

        // cutoffs: now-1h (raw), now-1d (60s), -inf (3600s)
        let selected = policy.select("cpu_busy", NOW, NOW - 2 * HOUR, None);
        assert_eq!(step_of(selected), Some(60_000));
        assert_eq!(selected.unwrap().statistic(), Statistic::Avg);
    }

    #[test]
    fn test_recent_window_is_raw() {
        let policy = three_tier_policy();
        assert_eq!(policy.select("cpu_busy", NOW, NOW - 30 * 60_000, None), None);
    }

    #[test]
    fn test_old_window_selects_unbounded_tier() {
        let policy = three_tier_policy();
        let selected = policy.select("cpu_busy", NOW, NOW - 30 * DAY, None);
        assert_eq!(step_of(selected), Some(3_600_000));
    }

    #[test]
    fn test_cutoff_equal_to_start_qualifies() {
        let policy = three_tier_policy();
        assert_eq!(policy.select("cpu_busy", NOW, NOW - HOUR, None), None);
        assert_eq!(
            step_of(policy.select("cpu_busy", NOW, NOW - DAY, None)),
            Some(60_000)
        );
    }

    #[test]
    fn test_fallback_is_coarsest_tier() {
        let policy = RetentionPolicy::from_config(&[RetentionSectionConfig {
            metric: None,
            tiers: vec![
                tier(Some("1h"), None),
                tier(Some("1d"), Some("avg:5:minute")),
            ],
        }]);

        let selected = policy.select("m", NOW, NOW - 7 * DAY, None);
        assert_eq!(step_of(selected), Some(300_000));
    }

    #[test]
    fn test_explicit_interval_overrides_start() {
        let policy = three_tier_policy();
        let selected = policy.select("cpu_busy", NOW, NOW - 30 * DAY, Some(2 * HOUR));
        assert_eq!(step_of(selected), Some(60_000));
    }

    #[test]
    fn test_widening_never_narrows() {
        let policy = three_tier_policy();
        let spans = [HOUR / 2, HOUR, 2 * HOUR, DAY, 2 * DAY, 90 * DAY];

        let steps: Vec<i64> = spans
            .iter()
            .map(|span| step_of(policy.select("m", NOW, NOW - span, None)).unwrap_or(0))
            .collect();

        for pair in steps.windows(2) {
            assert!(pair[0] <= pair[1], "steps not monotonic: {:?}", steps);
        }
    }

    #[test]
    fn test_empty_table_is_raw() {
        assert_eq!(RetentionPolicy::empty().select("m", NOW, NOW - DAY, None), None);
    }

    #[test]
    fn test_first_matching_section_wins() {
        let policy = RetentionPolicy::from_config(&[
            RetentionSectionConfig {
                metric: Some("disk_*".to_string()),
                tiers: vec![tier(None, Some("max:10:minute"))],
            },
            RetentionSectionConfig {
                metric: None,
                tiers: vec![tier(None, Some("avg:1:minute"))],
            },
        ]);

        let disk = policy.select("disk_used", NOW, NOW - HOUR, None).unwrap();
        assert_eq!(disk.statistic(), Statistic::Max);
        assert_eq!(disk.step_ms(), 600_000);

        let cpu = policy.select("cpu_busy", NOW, NOW - HOUR, None).unwrap();
        assert_eq!(cpu.step_ms(), 60_000);
    }

    #[test]
    fn test_no_matching_section_is_raw() {
        let policy = RetentionPolicy::from_config(&[RetentionSectionConfig {
            metric: Some("disk_*".to_string()),
            tiers: vec![tier(None, Some("avg:1:minute"))],
        }]);
        assert_eq!(policy.select("cpu_busy", NOW, NOW - DAY, None), None);
    }

    #[test]
    fn test_malformed_sections_are_skipped() {
        let policy = RetentionPolicy::from_config(&[
            RetentionSectionConfig {
                metric: None,
                tiers: vec![tier(Some("soon"), Some("avg:1:minute"))],
            },
            RetentionSectionConfig {
                metric: None,
                tiers: vec![tier(None, Some("avg:0:minute"))],
            },
            RetentionSectionConfig {
                metric: None,
                tiers: vec![],
            },
            RetentionSectionConfig {
                metric: None,
                tiers: vec![tier(None, Some("max:2:minute"))],
            },
        ]);

        let selected = policy.select("m", NOW, NOW - HOUR, None).unwrap();
        assert_eq!(selected.statistic(), Statistic::Max);
    }

    #[test]
    fn test_parse_age() {
        assert_eq!(parse_age("90s").unwrap(), Some(90_000));
        assert_eq!(parse_age("30m").unwrap(), Some(1_800_000));
        assert_eq!(parse_age("1h").unwrap(), Some(HOUR));
        assert_eq!(parse_age("2 days").unwrap(), Some(2 * DAY));
        assert_eq!(parse_age("1w").unwrap(), Some(7 * DAY));
        assert_eq!(parse_age("inf").unwrap(), None);
        assert!(parse_age("-1h").is_err());
        assert!(parse_age("1 fortnight").is_err());
    }
}
