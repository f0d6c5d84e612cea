//! View schemas
//!
//! A view is a named, declarative namespace: level `i` describes path
//! segment `i + 1` under the view root.
//!
//! ```toml
//! [views.hosts]
//! levels = [
//!     { type = "entity-folder", value = [{ expr = "nur*", label = "NUR" }] },
//!     { type = "entity" },
//!     { type = "metric", value = ["cpu_*", "disk_*"] },
//!     { type = "collection", items = [
//!         { type = "tag", value = ["mount"] },
//!         { type = "period", prefix = "p", leaf = true, value = [
//!             { label = "raw", count = 0 },
//!             { label = "5 min", count = 5, unit = "minute" },
//!         ] },
//!     ] },
//! ]
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::{FinderError, FinderResult};
use crate::pattern::{Token, TokenKind};
use crate::series::{AggregationDescriptor, Statistic, TimeUnit};

/// `[views.<name>]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub levels: Vec<Level>,
}

/// One depth of a view
#[derive(Debug, Clone, Deserialize)]
pub struct Level {
    #[serde(flatten)]
    pub kind: LevelKind,

    /// Segments of this level read `[prefix] name`
    #[serde(default)]
    pub prefix: Option<String>,

    /// Nodes of this level are leaves
    #[serde(default)]
    pub leaf: bool,

    /// Values pinned whenever this level is traversed
    #[serde(default)]
    pub pins: Pins,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LevelKind {
    Const {
        value: Vec<String>,
    },
    #[serde(alias = "entity folder")]
    EntityFolder {
        value: Vec<FolderEntry>,
    },
    #[serde(alias = "metric folder")]
    MetricFolder {
        value: Vec<FolderEntry>,
    },
    /// Entities matching any of the name expressions
    Entity {
        #[serde(default = "any_name")]
        value: Vec<String>,
    },
    /// Metrics matching any of the name expressions
    Metric {
        #[serde(default = "any_name")]
        value: Vec<String>,
    },
    /// Fixed tag names; the segment is their values joined by `, `
    Tag {
        value: Vec<String>,
    },
    Aggregator {
        value: Vec<AggregatorEntry>,
    },
    Period {
        value: Vec<PeriodEntry>,
    },
    Interval {
        value: Vec<PeriodEntry>,
    },
    /// Alternatives evaluated at the same depth
    Collection {
        items: Vec<Level>,
    },
}

fn any_name() -> Vec<String> {
    vec!["*".to_string()]
}

impl LevelKind {
    /// Kind of token this level binds, `None` for collections
    pub fn token_kind(&self) -> Option<TokenKind> {
        match self {
            LevelKind::Const { .. } => Some(TokenKind::Const),
            LevelKind::EntityFolder { .. } => Some(TokenKind::EntityFolder),
            LevelKind::MetricFolder { .. } => Some(TokenKind::MetricFolder),
            LevelKind::Entity { .. } => Some(TokenKind::Entity),
            LevelKind::Metric { .. } => Some(TokenKind::Metric),
            LevelKind::Tag { .. } => Some(TokenKind::Tag),
            LevelKind::Aggregator { .. } => Some(TokenKind::Aggregator),
            LevelKind::Period { .. } => Some(TokenKind::Period),
            LevelKind::Interval { .. } => Some(TokenKind::Interval),
            LevelKind::Collection { .. } => None,
        }
    }
}

/// Folder bucket: name expression and the label shown in the path
#[derive(Debug, Clone, Deserialize)]
pub struct FolderEntry {
    pub expr: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorEntry {
    pub statistic: Statistic,
    pub label: String,
}

/// Labelled period; `count = 0` means raw samples
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodEntry {
    pub label: String,
    pub count: i64,
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,
}

fn default_unit() -> TimeUnit {
    TimeUnit::Second
}

impl PeriodEntry {
    pub fn new(label: impl Into<String>, count: i64, unit: TimeUnit) -> Self {
        Self {
            label: label.into(),
            count,
            unit,
        }
    }

    /// Length in milliseconds, `None` for raw
    pub fn step_ms(&self) -> Option<i64> {
        (self.count > 0).then(|| self.count.saturating_mul(self.unit.millis()))
    }

    fn validate(&self) -> FinderResult<()> {
        if self.count < 0 {
            return Err(FinderError::Config(format!(
                "period '{}' has negative count {}",
                self.label, self.count
            )));
        }
        if self.count > 0 {
            AggregationDescriptor::new(Statistic::Avg, self.count, self.unit)?;
        }
        Ok(())
    }
}

/// Values a level pins when traversed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Pins {
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub entity_folder: Option<String>,
    #[serde(default)]
    pub metric_folder: Option<String>,
    #[serde(default)]
    pub aggregator: Option<Statistic>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Pins {
    pub fn tokens(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        if let Some(expr) = &self.entity_folder {
            tokens.push(Token::EntityFolder(expr.clone()));
        }
        if let Some(expr) = &self.metric_folder {
            tokens.push(Token::MetricFolder(expr.clone()));
        }
        if let Some(entity) = &self.entity {
            tokens.push(Token::Entity(entity.clone()));
        }
        if let Some(metric) = &self.metric {
            tokens.push(Token::Metric(metric.clone()));
        }
        if let Some(stat) = self.aggregator {
            tokens.push(Token::Aggregator(stat));
        }
        for (name, value) in &self.tags {
            tokens.push(Token::Tag {
                name: name.clone(),
                value: value.clone(),
            });
        }
        tokens
    }
}

impl Level {
    /// `[prefix] ` as it appears in front of segment text
    pub fn prefix_text(&self) -> String {
        self.prefix
            .as_ref()
            .map(|p| format!("[{}] ", p))
            .unwrap_or_default()
    }

    /// Text of `segment` without this level's prefix, if it carries it
    pub fn strip_prefix<'a>(&self, segment: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(_) => segment.strip_prefix(self.prefix_text().as_str()),
            None if segment.starts_with('[') && segment.contains("] ") => None,
            None => Some(segment),
        }
    }

    fn validate(&self, nested: bool) -> FinderResult<()> {
        match &self.kind {
            LevelKind::Const { value } if value.is_empty() => {
                Err(FinderError::Config("const level without values".into()))
            }
            LevelKind::Tag { value } if value.is_empty() => {
                Err(FinderError::Config("tag level without tag names".into()))
            }
            LevelKind::Period { value } | LevelKind::Interval { value } => {
                value.iter().try_for_each(PeriodEntry::validate)
            }
            LevelKind::Collection { .. } if nested => {
                Err(FinderError::Config("collections cannot be nested".into()))
            }
            LevelKind::Collection { items } => {
                if items.is_empty() {
                    return Err(FinderError::Config("empty collection".into()));
                }
                let mut seen = HashSet::new();
                for item in items {
                    if !seen.insert((item.prefix.clone(), item.leaf)) {
                        return Err(FinderError::Config(format!(
                            "collection alternatives share prefix {:?}",
                            item.prefix
                        )));
                    }
                    item.validate(true)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// A validated view
#[derive(Debug, Clone)]
pub struct ViewSchema {
    name: String,
    levels: Vec<Level>,
}

impl ViewSchema {
    /// Validate a configured view; errors here are fatal at startup
    pub fn new(name: impl Into<String>, config: ViewConfig) -> FinderResult<Self> {
        let name = name.into();
        if config.levels.is_empty() {
            return Err(FinderError::Config(format!("view '{}' has no levels", name)));
        }
        for (i, level) in config.levels.iter().enumerate() {
            level
                .validate(false)
                .map_err(|e| FinderError::Config(format!("view '{}' level {}: {}", name, i, e)))?;
        }
        Ok(Self {
            name,
            levels: config.levels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }
}
