//! Typed path tokens
//!
//! A path segment, once bound to its level, becomes a [`Token`]. Folding the
//! tokens of a path in order yields the [`Scope`] a branch enumerates under
//! or a leaf reads from.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::FinderResult;
use crate::series::{AggregationDescriptor, SeriesIdentity, Statistic, TimeUnit};

/// Kind of a segment, as declared by a typed `{type, value}` segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Root,
    #[serde(alias = "entity folder")]
    EntityFolder,
    #[serde(alias = "metric folder")]
    MetricFolder,
    Entity,
    Metric,
    Tag,
    Aggregator,
    Interval,
    Period,
    Const,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Root => "root",
            TokenKind::EntityFolder => "entity-folder",
            TokenKind::MetricFolder => "metric-folder",
            TokenKind::Entity => "entity",
            TokenKind::Metric => "metric",
            TokenKind::Tag => "tag",
            TokenKind::Aggregator => "aggregator",
            TokenKind::Interval => "interval",
            TokenKind::Period => "period",
            TokenKind::Const => "const",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bound path segment
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `entities`, `metrics` or a view name
    Root(String),
    /// Name expression of an entity folder
    EntityFolder(String),
    /// Name expression of a metric folder
    MetricFolder(String),
    Entity(String),
    Metric(String),
    Tag { name: String, value: String },
    Aggregator(Statistic),
    /// Aggregation period in ms, `None` for raw samples
    Period(Option<i64>),
    /// Look-back window in ms used for retention selection
    Interval(Option<i64>),
    Const(String),
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Root(_) => TokenKind::Root,
            Token::EntityFolder(_) => TokenKind::EntityFolder,
            Token::MetricFolder(_) => TokenKind::MetricFolder,
            Token::Entity(_) => TokenKind::Entity,
            Token::Metric(_) => TokenKind::Metric,
            Token::Tag { .. } => TokenKind::Tag,
            Token::Aggregator(_) => TokenKind::Aggregator,
            Token::Period(_) => TokenKind::Period,
            Token::Interval(_) => TokenKind::Interval,
            Token::Const(_) => TokenKind::Const,
        }
    }
}

/// Everything pinned by the tokens of a path so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub root: Option<String>,
    pub entity_folder: Option<String>,
    pub metric_folder: Option<String>,
    pub entity: Option<String>,
    pub metric: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub aggregator: Option<Statistic>,
    pub period_ms: Option<i64>,
    pub interval_ms: Option<i64>,
}

impl Scope {
    /// Pin whatever `token` carries; later tokens override earlier ones
    pub fn apply(&mut self, token: &Token) {
        match token {
            Token::Root(name) => self.root = Some(name.clone()),
            Token::EntityFolder(expr) => self.entity_folder = Some(expr.clone()),
            Token::MetricFolder(expr) => self.metric_folder = Some(expr.clone()),
            Token::Entity(name) => self.entity = Some(name.clone()),
            Token::Metric(name) => self.metric = Some(name.clone()),
            Token::Tag { name, value } => {
                self.tags.insert(name.clone(), value.clone());
            }
            Token::Aggregator(stat) => self.aggregator = Some(*stat),
            Token::Period(step) => self.period_ms = *step,
            Token::Interval(interval) => self.interval_ms = *interval,
            Token::Const(_) => {}
        }
    }

    /// Builder method: apply several tokens
    pub fn with(mut self, tokens: &[Token]) -> Self {
        for token in tokens {
            self.apply(token);
        }
        self
    }

    /// Series addressed by this scope; the entity defaults to every entity
    pub fn identity(&self) -> Option<SeriesIdentity> {
        let metric = self.metric.as_ref()?;
        let entity = self.entity.as_deref().unwrap_or("*");
        Some(SeriesIdentity::new(entity, metric.as_str()).tags(self.tags.clone()))
    }

    /// Aggregation pinned by a period, `AVG` unless an aggregator is pinned
    pub fn aggregation(&self) -> FinderResult<Option<AggregationDescriptor>> {
        self.period_ms
            .map(|step| {
                AggregationDescriptor::new(
                    self.aggregator.unwrap_or(Statistic::Avg),
                    step,
                    TimeUnit::Millisecond,
                )
            })
            .transpose()
    }
}
