//! Configured view namespaces
//!
//! Binding and enumeration for one level of a [`ViewSchema`]. Collections
//! hold alternatives at the same depth; a segment picks its alternative by
//! prefix, then by declared kind, then by whether the request wants a leaf.

use std::collections::BTreeSet;

use super::schema::{Level, LevelKind, ViewSchema};
use super::Position;
use crate::backend::NameFilter;
use crate::cache::MetadataCache;
use crate::error::{FinderError, FinderResult};
use crate::pattern::{PathGlob, Scope, Segment, Token};

fn malformed(message: String) -> FinderError {
    FinderError::MalformedPattern(message)
}

fn glob_matches(pattern: &str, name: &str) -> bool {
    PathGlob::new(pattern)
        .map(|glob| glob.matches(name))
        .unwrap_or(false)
}

/// Alternatives of a level
fn alternatives(level: &Level) -> &[Level] {
    match &level.kind {
        LevelKind::Collection { items } => items,
        _ => std::slice::from_ref(level),
    }
}

/// Bind a literal segment below `pos`
pub(super) fn bind(
    view: &ViewSchema,
    pos: &Position,
    segment: &Segment,
    final_exact: bool,
) -> FinderResult<(Vec<Token>, bool)> {
    let level = view.level(pos.depth).ok_or_else(|| {
        malformed(format!(
            "view '{}' has {} levels, '{}' is deeper",
            view.name(),
            view.depth(),
            segment.text()
        ))
    })?;

    let candidates: Vec<(&Level, &str)> = alternatives(level)
        .iter()
        .filter(|alt| segment.kind().is_none() || alt.kind.token_kind() == segment.kind())
        .filter_map(|alt| alt.strip_prefix(segment.text()).map(|text| (alt, text)))
        .collect();

    let (alt, text) = candidates
        .iter()
        .find(|(alt, _)| alt.leaf == final_exact)
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| {
            malformed(format!(
                "'{}' fits no level of view '{}'",
                segment.text(),
                view.name()
            ))
        })?;

    let mut tokens = alt.pins.tokens();
    tokens.extend(bind_value(&alt.kind, text)?);
    Ok((tokens, alt.leaf))
}

fn bind_value(kind: &LevelKind, text: &str) -> FinderResult<Vec<Token>> {
    let unknown = || malformed(format!("unknown value '{}'", text));

    let token = match kind {
        LevelKind::Const { value } => {
            if !value.iter().any(|v| v == text) {
                return Err(unknown());
            }
            Token::Const(text.to_string())
        }
        LevelKind::EntityFolder { value } => {
            let entry = value.iter().find(|f| f.label == text).ok_or_else(unknown)?;
            Token::EntityFolder(entry.expr.clone())
        }
        LevelKind::MetricFolder { value } => {
            let entry = value.iter().find(|f| f.label == text).ok_or_else(unknown)?;
            Token::MetricFolder(entry.expr.clone())
        }
        LevelKind::Entity { .. } => Token::Entity(text.to_string()),
        LevelKind::Metric { .. } => Token::Metric(text.to_string()),
        LevelKind::Tag { value: names } => {
            let values: Vec<&str> = text.split(", ").collect();
            if values.len() != names.len() {
                return Err(malformed(format!(
                    "'{}' does not hold {} tag values",
                    text,
                    names.len()
                )));
            }
            return Ok(names
                .iter()
                .zip(values)
                .map(|(name, value)| Token::Tag {
                    name: name.clone(),
                    value: value.to_string(),
                })
                .collect());
        }
        LevelKind::Aggregator { value } => {
            let entry = value.iter().find(|a| a.label == text).ok_or_else(unknown)?;
            Token::Aggregator(entry.statistic)
        }
        LevelKind::Period { value } => {
            let entry = value.iter().find(|p| p.label == text).ok_or_else(unknown)?;
            Token::Period(entry.step_ms())
        }
        LevelKind::Interval { value } => {
            let entry = value.iter().find(|p| p.label == text).ok_or_else(unknown)?;
            Token::Interval(entry.step_ms())
        }
        LevelKind::Collection { .. } => {
            return Err(malformed("collections cannot be nested".to_string()))
        }
    };
    Ok(vec![token])
}

/// Name expressions of an entity or metric level, narrowed by a pinned folder
fn name_expressions(value: &[String], folder: Option<&str>) -> Vec<String> {
    let exprs: Vec<String> = value
        .iter()
        .filter_map(|expr| match (expr.as_str(), folder) {
            ("*", Some(folder)) => Some(folder.to_string()),
            ("*", None) => Some("*".to_string()),
            (expr, Some(folder)) if !glob_matches(folder, expr) => None,
            (expr, _) => Some(expr.to_string()),
        })
        .collect();

    if exprs.iter().any(|e| e == "*") {
        vec!["*".to_string()]
    } else {
        exprs
    }
}

/// Children of `pos` at the next level of `view`
pub(super) async fn children(
    view: &ViewSchema,
    metadata: &MetadataCache,
    pos: &Position,
) -> FinderResult<Vec<Position>> {
    let Some(level) = view.level(pos.depth) else {
        return Ok(Vec::new());
    };

    let mut children = Vec::new();
    for alt in alternatives(level) {
        let pins = alt.pins.tokens();
        let scope = pos.scope.clone().with(&pins);
        let prefix = alt.prefix_text();

        let named = match alternative_children(alt, metadata, &scope).await {
            Ok(named) => named,
            Err(e) => {
                tracing::warn!(path = %pos.path, alternative = %prefix, error = %e, "Alternative enumeration failed");
                continue;
            }
        };
        children.extend(named.into_iter().map(|(text, token_list)| {
            let mut tokens = pins.clone();
            tokens.extend(token_list);
            pos.child(&format!("{}{}", prefix, text), tokens, alt.leaf)
        }));
    }
    Ok(children)
}

/// Segment text and tokens of each node one alternative yields
async fn alternative_children(
    alt: &Level,
    metadata: &MetadataCache,
    scope: &Scope,
) -> FinderResult<Vec<(String, Vec<Token>)>> {
    let one = |text: &str, token: Token| (text.to_string(), vec![token]);

    let named = match &alt.kind {
        LevelKind::Const { value } => value
            .iter()
            .map(|v| one(v, Token::Const(v.clone())))
            .collect(),
        LevelKind::EntityFolder { value } => value
            .iter()
            .filter(|f| {
                scope
                    .entity_folder
                    .as_deref()
                    .map_or(true, |pinned| glob_matches(pinned, &f.expr))
            })
            .map(|f| one(&f.label, Token::EntityFolder(f.expr.clone())))
            .collect(),
        LevelKind::MetricFolder { value } => value
            .iter()
            .filter(|f| {
                scope
                    .metric_folder
                    .as_deref()
                    .map_or(true, |pinned| glob_matches(pinned, &f.expr))
            })
            .map(|f| one(&f.label, Token::MetricFolder(f.expr.clone())))
            .collect(),
        LevelKind::Entity { value } => {
            let exprs = name_expressions(value, scope.entity_folder.as_deref());
            if exprs.is_empty() {
                return Ok(Vec::new());
            }

            let names: Vec<String> = match scope.metric.as_deref() {
                None if alt.leaf => Vec::new(),
                None => metadata
                    .backend()
                    .entities(&NameFilter::Like(exprs))
                    .await?
                    .into_iter()
                    .map(|e| e.name)
                    .collect(),
                Some(metric) => metadata
                    .entity_and_tags(metric)
                    .await?
                    .into_iter()
                    .map(|combo| combo.entity)
                    .filter(|entity| exprs.iter().any(|e| glob_matches(e, entity)))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            };
            names
                .iter()
                .map(|n| one(n, Token::Entity(n.clone())))
                .collect()
        }
        LevelKind::Metric { value } => {
            let exprs = name_expressions(value, scope.metric_folder.as_deref());
            if exprs.is_empty() {
                return Ok(Vec::new());
            }

            let filter = NameFilter::Like(exprs);
            let metrics = match scope.entity.as_deref() {
                None => metadata.backend().metrics(&filter).await?,
                Some(entity) => metadata.backend().entity_metrics(entity, &filter).await?,
            };
            metrics
                .iter()
                .map(|m| one(&m.name, Token::Metric(m.name.clone())))
                .collect()
        }
        LevelKind::Tag { value: names } => {
            let Some(metric) = scope.metric.as_deref() else {
                return Ok(Vec::new());
            };

            let mut seen = BTreeSet::new();
            let mut named = Vec::new();
            for combo in metadata.entity_and_tags(metric).await? {
                if scope.entity.as_deref().map_or(false, |e| e != combo.entity) {
                    continue;
                }
                let Some(values) = names
                    .iter()
                    .map(|n| combo.tags.get(n).cloned())
                    .collect::<Option<Vec<String>>>()
                else {
                    continue;
                };
                let consistent = combo
                    .tags
                    .iter()
                    .all(|(k, v)| scope.tags.get(k).map_or(true, |pinned| pinned == v));
                if !consistent || !seen.insert(values.clone()) {
                    continue;
                }

                let tokens = names
                    .iter()
                    .zip(&values)
                    .map(|(name, value)| Token::Tag {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect();
                named.push((values.join(", "), tokens));
            }
            named
        }
        LevelKind::Aggregator { value } => value
            .iter()
            .map(|a| one(&a.label, Token::Aggregator(a.statistic)))
            .collect(),
        LevelKind::Period { value } => value
            .iter()
            .map(|p| one(&p.label, Token::Period(p.step_ms())))
            .collect(),
        LevelKind::Interval { value } => value
            .iter()
            .map(|p| one(&p.label, Token::Interval(p.step_ms())))
            .collect(),
        LevelKind::Collection { .. } => Vec::new(),
    };
    Ok(named)
}
