//! Fixed tree namespaces
//!
//! `entities` and `metrics` share one layout that differs only in the order
//! of the entity and metric levels:
//!
//! | depth | entities        | metrics         |
//! |-------|-----------------|-----------------|
//! | 1     | entity folder   | metric folder   |
//! | 2     | entity          | metric          |
//! | 3     | metric          | entity          |
//! | 4+    | `tag: value`... then `detail` or `stats.<aggregator>.<period>` |

use std::collections::{BTreeMap, BTreeSet};

use super::schema::{AggregatorEntry, PeriodEntry};
use super::Position;
use crate::backend::NameFilter;
use crate::cache::MetadataCache;
use crate::error::{FinderError, FinderResult};
use crate::pattern::{Segment, Token};
use crate::series::{Statistic, TimeUnit};

pub const ENTITIES: &str = "entities";
pub const METRICS: &str = "metrics";
pub const ROOTS: [&str; 2] = [ENTITIES, METRICS];

/// Folder collecting names no other folder claims
pub const CATCH_ALL: &str = "_";
const DETAIL: &str = "detail";
const STATS: &str = "stats";

/// Layout of the fixed tree namespaces
#[derive(Debug, Clone)]
pub struct TreeSchema {
    entity_folders: Vec<String>,
    metric_folders: Vec<String>,
    aggregators: Vec<AggregatorEntry>,
    periods: Vec<PeriodEntry>,
}

impl Default for TreeSchema {
    fn default() -> Self {
        Self {
            entity_folders: default_folders(),
            metric_folders: default_folders(),
            aggregators: default_aggregators(),
            periods: default_periods(),
        }
    }
}

/// `a` through `z`, then the catch-all
pub fn default_folders() -> Vec<String> {
    ('a'..='z')
        .map(String::from)
        .chain(std::iter::once(CATCH_ALL.to_string()))
        .collect()
}

pub fn default_aggregators() -> Vec<AggregatorEntry> {
    [
        (Statistic::Avg, "Average"),
        (Statistic::Min, "Minimum"),
        (Statistic::Max, "Maximum"),
        (Statistic::Sum, "Sum"),
        (Statistic::Count, "Count"),
        (Statistic::First, "First value"),
        (Statistic::Last, "Last value"),
        (Statistic::Percentile999, "Percentile 99.9%"),
        (Statistic::Percentile995, "Percentile 99.5%"),
        (Statistic::Percentile99, "Percentile 99%"),
        (Statistic::Percentile95, "Percentile 95%"),
        (Statistic::Percentile90, "Percentile 90%"),
        (Statistic::Percentile75, "Percentile 75%"),
        (Statistic::Median, "Median"),
        (Statistic::StandardDeviation, "Standard deviation"),
        (Statistic::Delta, "Delta"),
        (Statistic::Wavg, "Weighted average"),
        (Statistic::Wtavg, "Weighted time average"),
    ]
    .into_iter()
    .map(|(statistic, label)| AggregatorEntry {
        statistic,
        label: label.to_string(),
    })
    .collect()
}

pub fn default_periods() -> Vec<PeriodEntry> {
    vec![
        PeriodEntry::new("1 sec", 1, TimeUnit::Second),
        PeriodEntry::new("1 min", 1, TimeUnit::Minute),
        PeriodEntry::new("1 hour", 1, TimeUnit::Hour),
        PeriodEntry::new("1 day", 1, TimeUnit::Day),
    ]
}

/// Where the tail of a tree path stands after its last token
enum Stage {
    Tags,
    Aggregators,
    Periods,
    Done,
}

impl TreeSchema {
    pub fn new(
        entity_folders: Vec<String>,
        metric_folders: Vec<String>,
        aggregators: Vec<AggregatorEntry>,
        periods: Vec<PeriodEntry>,
    ) -> FinderResult<Self> {
        if entity_folders.is_empty() || metric_folders.is_empty() {
            return Err(FinderError::Config("tree folders cannot be empty".into()));
        }
        if let Some(p) = periods.iter().find(|p| p.step_ms().is_none()) {
            return Err(FinderError::Config(format!(
                "tree period '{}' must be positive",
                p.label
            )));
        }
        let mut labels = BTreeSet::new();
        if let Some(a) = aggregators.iter().find(|a| !labels.insert(a.label.as_str())) {
            return Err(FinderError::Config(format!(
                "duplicate aggregator label '{}'",
                a.label
            )));
        }

        Ok(Self {
            entity_folders,
            metric_folders,
            aggregators,
            periods,
        })
    }

    fn folders(&self, root: &str) -> &[String] {
        if root == ENTITIES {
            &self.entity_folders
        } else {
            &self.metric_folders
        }
    }

    fn stage(pos: &Position) -> Stage {
        match pos.tokens.last() {
            Some(Token::Const(c)) if c == STATS => Stage::Aggregators,
            Some(Token::Aggregator(_)) => Stage::Periods,
            Some(Token::Const(_)) | Some(Token::Period(_)) => Stage::Done,
            _ => Stage::Tags,
        }
    }

    /// Bind a literal segment below `pos` without touching the backend
    pub(super) fn bind(&self, pos: &Position, segment: &Segment) -> FinderResult<(Vec<Token>, bool)> {
        let text = segment.text();
        let entities_first = pos.root_name() == ENTITIES;

        let (token, leaf) = match pos.depth {
            0 if entities_first => (Token::EntityFolder(text.to_string()), false),
            0 => (Token::MetricFolder(text.to_string()), false),
            1 | 2 if entities_first == (pos.depth == 1) => (Token::Entity(text.to_string()), false),
            1 | 2 => (Token::Metric(text.to_string()), false),
            _ => match Self::stage(pos) {
                Stage::Tags => match text {
                    DETAIL => (Token::Const(DETAIL.to_string()), true),
                    STATS => (Token::Const(STATS.to_string()), false),
                    _ => {
                        let (name, value) = text.split_once(": ").ok_or_else(|| {
                            FinderError::MalformedPattern(format!("'{}' is not a tag", text))
                        })?;
                        let tag = Token::Tag {
                            name: name.to_string(),
                            value: value.to_string(),
                        };
                        (tag, false)
                    }
                },
                Stage::Aggregators => {
                    let entry = self
                        .aggregators
                        .iter()
                        .find(|a| a.label == text)
                        .ok_or_else(|| {
                            FinderError::MalformedPattern(format!("unknown aggregator '{}'", text))
                        })?;
                    (Token::Aggregator(entry.statistic), false)
                }
                Stage::Periods => {
                    let entry = self.periods.iter().find(|p| p.label == text).ok_or_else(|| {
                        FinderError::MalformedPattern(format!("unknown period '{}'", text))
                    })?;
                    (Token::Period(entry.step_ms()), true)
                }
                Stage::Done => {
                    return Err(FinderError::MalformedPattern(format!(
                        "'{}' is below a leaf",
                        text
                    )))
                }
            },
        };

        if let Some(kind) = segment.kind() {
            if kind != token.kind() {
                return Err(FinderError::MalformedPattern(format!(
                    "segment declared as {} binds a {}",
                    kind,
                    token.kind()
                )));
            }
        }

        Ok((vec![token], leaf))
    }

    /// Children of `pos`, querying metadata where the level is open
    pub(super) async fn children(
        &self,
        metadata: &MetadataCache,
        pos: &Position,
    ) -> FinderResult<Vec<Position>> {
        let entities_first = pos.root_name() == ENTITIES;
        let scope = &pos.scope;

        match pos.depth {
            0 => Ok(self
                .folders(pos.root_name())
                .iter()
                .map(|folder| {
                    let token = if entities_first {
                        Token::EntityFolder(folder.clone())
                    } else {
                        Token::MetricFolder(folder.clone())
                    };
                    pos.child(folder, vec![token], false)
                })
                .collect()),
            1 => {
                let folder = if entities_first {
                    scope.entity_folder.as_deref()
                } else {
                    scope.metric_folder.as_deref()
                }
                .unwrap_or(CATCH_ALL);
                let names = self.folder_names(metadata, pos.root_name(), folder).await?;

                Ok(names
                    .iter()
                    .map(|name| {
                        let token = if entities_first {
                            Token::Entity(name.clone())
                        } else {
                            Token::Metric(name.clone())
                        };
                        pos.child(name, vec![token], false)
                    })
                    .collect())
            }
            2 if entities_first => {
                let Some(entity) = scope.entity.as_deref() else {
                    return Ok(Vec::new());
                };
                let metrics = metadata
                    .backend()
                    .entity_metrics(entity, &NameFilter::All)
                    .await?;
                Ok(metrics
                    .iter()
                    .map(|m| pos.child(&m.name, vec![Token::Metric(m.name.clone())], false))
                    .collect())
            }
            2 => {
                let Some(metric) = scope.metric.as_deref() else {
                    return Ok(Vec::new());
                };
                let entities: BTreeSet<String> = metadata
                    .entity_and_tags(metric)
                    .await?
                    .into_iter()
                    .map(|combo| combo.entity)
                    .collect();
                Ok(entities
                    .iter()
                    .map(|e| pos.child(e, vec![Token::Entity(e.clone())], false))
                    .collect())
            }
            _ => match Self::stage(pos) {
                Stage::Tags => self.tag_children(metadata, pos).await,
                Stage::Aggregators => Ok(self
                    .aggregators
                    .iter()
                    .map(|a| pos.child(&a.label, vec![Token::Aggregator(a.statistic)], false))
                    .collect()),
                Stage::Periods => Ok(self
                    .periods
                    .iter()
                    .map(|p| pos.child(&p.label, vec![Token::Period(p.step_ms())], true))
                    .collect()),
                Stage::Done => Ok(Vec::new()),
            },
        }
    }

    /// Names listed under a folder; the catch-all skips names other folders claim
    async fn folder_names(
        &self,
        metadata: &MetadataCache,
        root: &str,
        folder: &str,
    ) -> FinderResult<Vec<String>> {
        let filter = if folder == CATCH_ALL {
            NameFilter::All
        } else {
            NameFilter::like(format!("{}*", folder))
        };

        let backend = metadata.backend();
        let mut names: Vec<String> = if root == ENTITIES {
            backend
                .entities(&filter)
                .await?
                .into_iter()
                .map(|e| e.name)
                .collect()
        } else {
            backend
                .metrics(&filter)
                .await?
                .into_iter()
                .map(|m| m.name)
                .collect()
        };

        if folder == CATCH_ALL {
            let claimed: Vec<&String> = self
                .folders(root)
                .iter()
                .filter(|f| f.as_str() != CATCH_ALL)
                .collect();
            names.retain(|name| !claimed.iter().any(|f| name.starts_with(f.as_str())));
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Values of the first sorted unpinned tag that still varies across the
    /// matching combinations, or `detail` and `stats` once none varies
    async fn tag_children(
        &self,
        metadata: &MetadataCache,
        pos: &Position,
    ) -> FinderResult<Vec<Position>> {
        let scope = &pos.scope;
        let (Some(entity), Some(metric)) = (scope.entity.as_deref(), scope.metric.as_deref())
        else {
            return Ok(Vec::new());
        };

        let combos = metadata.entity_and_tags(metric).await?;
        let suitable: Vec<&BTreeMap<String, String>> = combos
            .iter()
            .filter(|c| c.entity == entity)
            .filter(|c| {
                scope
                    .tags
                    .iter()
                    .all(|(name, value)| c.tags.get(name) == Some(value))
            })
            .map(|c| &c.tags)
            .collect();

        let unpinned: BTreeSet<&String> = suitable
            .iter()
            .flat_map(|tags| tags.keys())
            .filter(|name| !scope.tags.contains_key(*name))
            .collect();

        // Absence counts as a distinct value
        let varying = unpinned.into_iter().find_map(|name| {
            let values: BTreeSet<Option<&String>> =
                suitable.iter().map(|tags| tags.get(name)).collect();
            (values.len() > 1).then_some((name, values))
        });

        let Some((name, values)) = varying else {
            return Ok(vec![
                pos.child(DETAIL, vec![Token::Const(DETAIL.to_string())], true),
                pos.child(STATS, vec![Token::Const(STATS.to_string())], false),
            ]);
        };

        Ok(values
            .into_iter()
            .flatten()
            .map(|value| {
                let label = format!("{}: {}", name, value);
                let token = Token::Tag {
                    name: name.clone(),
                    value: value.clone(),
                };
                pos.child(&label, vec![token], false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let tree = TreeSchema::default();
        assert_eq!(tree.entity_folders.len(), 27);
        assert_eq!(tree.aggregators.len(), 18);
        assert_eq!(tree.aggregators[2].label, "Maximum");
        assert_eq!(tree.periods[2].step_ms(), Some(3_600_000));
    }

    #[test]
    fn test_invalid_layouts_rejected() {
        assert!(TreeSchema::new(vec![], default_folders(), vec![], vec![]).is_err());
        assert!(TreeSchema::new(
            default_folders(),
            default_folders(),
            vec![],
            vec![PeriodEntry::new("raw", 0, TimeUnit::Second)],
        )
        .is_err());

        let twice = vec![
            AggregatorEntry {
                statistic: Statistic::Avg,
                label: "A".into(),
            },
            AggregatorEntry {
                statistic: Statistic::Max,
                label: "A".into(),
            },
        ];
        assert!(TreeSchema::new(default_folders(), default_folders(), twice, vec![]).is_err());
    }
}
