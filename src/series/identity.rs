//! Series identity
//!
//! The `{entity, metric, tags}` tuple that addresses one logical series in
//! ATSD. Tags are kept in a `BTreeMap` so two identities with the same tags
//! compare and hash equal regardless of insertion order.

use std::collections::BTreeMap;
use std::fmt;

/// Immutable address of one series in the backend store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesIdentity {
    entity: String,
    metric: String,
    tags: BTreeMap<String, String>,
}

impl SeriesIdentity {
    /// Create an identity without tags
    pub fn new(entity: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            metric: metric.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Builder method: pin a tag value
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Builder method: pin several tag values
    pub fn tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn tag_set(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Whether the entity is an expression matching several entities
    pub fn has_entity_wildcard(&self) -> bool {
        self.entity.contains(['*', '?'])
    }
}

impl fmt::Display for SeriesIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.metric)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self
                .tags
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}
