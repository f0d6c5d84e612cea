//! ATSD wire types
//!
//! Request and response bodies of the ATSD REST API v1 endpoints used by the
//! finder: metadata listings and the multi-query `series` endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::series::{AggregationDescriptor, Sample, SeriesIdentity, Statistic, TimeRange};

/// Entity record from `GET entities`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    pub name: String,
    /// Unix timestamp in milliseconds
    #[serde(default)]
    pub last_insert_time: Option<i64>,
}

/// Metric record from `GET metrics`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInfo {
    pub name: String,
    /// Unix timestamp in milliseconds
    #[serde(default)]
    pub last_insert_time: Option<i64>,
    /// Retention in days, 0 or absent when kept forever
    #[serde(default, alias = "retentionDays")]
    pub retention_interval: Option<i64>,
}

/// One `(entity, tags)` combination from `GET metrics/{m}/entity-and-tags`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTags {
    pub entity: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub last_insert_time: Option<i64>,
}

/// Name restriction for metadata listings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameFilter {
    All,
    /// Names matching any of the wildcard expressions
    Like(Vec<String>),
}

impl NameFilter {
    pub fn like(expression: impl Into<String>) -> Self {
        NameFilter::Like(vec![expression.into()])
    }

    /// Value of the `expression` query parameter, `None` for no restriction
    pub fn expression(&self) -> Option<String> {
        match self {
            NameFilter::All => None,
            NameFilter::Like(exprs) if exprs.iter().any(|e| e == "*") => None,
            NameFilter::Like(exprs) => Some(
                exprs
                    .iter()
                    .map(|e| format!("name like '{}'", e.replace('\'', "\\'")))
                    .collect::<Vec<_>>()
                    .join(" or "),
            ),
        }
    }
}

/// `{count, unit}` period clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IntervalClause {
    pub count: i64,
    pub unit: String,
}

impl From<&AggregationDescriptor> for IntervalClause {
    fn from(agg: &AggregationDescriptor) -> Self {
        let (count, unit) = agg.wire_interval();
        Self {
            count,
            unit: unit.as_str().to_string(),
        }
    }
}

/// Per-series downsampling
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AggregateClause {
    pub types: Vec<String>,
    pub interval: IntervalClause,
    pub interpolate: String,
}

/// Merge of several series into one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupClause {
    #[serde(rename = "type")]
    pub kind: String,
    pub interval: IntervalClause,
}

/// One query of a `POST series` batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesQuery {
    pub entity: String,
    pub metric: String,
    pub tags: BTreeMap<String, Vec<String>>,
    /// Unix timestamp in milliseconds
    pub start_time: i64,
    /// Unix timestamp in milliseconds
    pub end_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupClause>,
}

impl SeriesQuery {
    /// Build the query for one series over `range`.
    ///
    /// Groupable statistics are requested as a `group`; the rest as an
    /// `aggregate` combined with a `SUM` group of the same period.
    pub fn new(
        identity: &SeriesIdentity,
        range: TimeRange,
        aggregation: Option<&AggregationDescriptor>,
    ) -> Self {
        let tags = identity
            .tag_set()
            .iter()
            .map(|(k, v)| (k.clone(), vec![v.clone()]))
            .collect();

        let mut query = Self {
            entity: identity.entity().to_string(),
            metric: identity.metric().to_string(),
            tags,
            start_time: range.start,
            end_time: range.end,
            request_id: None,
            aggregate: None,
            group: None,
        };

        if let Some(agg) = aggregation.filter(|a| !a.is_detail()) {
            let interval = IntervalClause::from(agg);
            if agg.statistic().is_groupable() {
                query.group = Some(GroupClause {
                    kind: agg.statistic().as_str().to_string(),
                    interval,
                });
            } else {
                query.group = Some(GroupClause {
                    kind: Statistic::Sum.as_str().to_string(),
                    interval: interval.clone(),
                });
                query.aggregate = Some(AggregateClause {
                    types: vec![agg.statistic().as_str().to_string()],
                    interval,
                    interpolate: agg.interpolation().as_str().to_string(),
                });
            }
        }

        query
    }

    /// Builder method: attach a correlation id
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Body of `POST series`
#[derive(Debug, Serialize)]
pub struct SeriesRequest<'a> {
    pub queries: &'a [SeriesQuery],
}

/// Response of `POST series`
#[derive(Debug, Default, Deserialize)]
pub struct SeriesResponse {
    #[serde(default)]
    pub series: Vec<SeriesResult>,
}

/// Samples for one query of a batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResult {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: Vec<Sample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeUnit;

    fn identity() -> SeriesIdentity {
        SeriesIdentity::new("nurswgvml007", "cpu_busy").tag("host", "a")
    }

    #[test]
    fn test_name_filter_expression() {
        assert_eq!(NameFilter::All.expression(), None);
        assert_eq!(NameFilter::like("*").expression(), None);
        assert_eq!(
            NameFilter::Like(vec!["a*".into(), "b*".into()]).expression(),
            Some("name like 'a*' or name like 'b*'".to_string())
        );
    }

    #[test]
    fn test_detail_query_has_no_clauses() {
        let range = TimeRange::new(1_000, 2_000).unwrap();
        let query = SeriesQuery::new(&identity(), range, Some(&AggregationDescriptor::detail()));
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["entity"], "nurswgvml007");
        assert_eq!(json["tags"]["host"][0], "a");
        assert_eq!(json["startTime"], 1_000);
        assert!(json.get("group").is_none());
        assert!(json.get("aggregate").is_none());
        assert!(json.get("requestId").is_none());
    }

    #[test]
    fn test_groupable_statistic_uses_group() {
        let range = TimeRange::new(0, 3_600_000).unwrap();
        let agg = AggregationDescriptor::new(Statistic::Max, 1, TimeUnit::Minute).unwrap();
        let query = SeriesQuery::new(&identity(), range, Some(&agg)).with_request_id("q1");
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["requestId"], "q1");
        assert_eq!(json["group"]["type"], "MAX");
        assert_eq!(json["group"]["interval"]["count"], 60);
        assert_eq!(json["group"]["interval"]["unit"], "SECOND");
        assert!(json.get("aggregate").is_none());
    }

    #[test]
    fn test_non_groupable_statistic_uses_aggregate() {
        let range = TimeRange::new(0, 3_600_000).unwrap();
        let agg = AggregationDescriptor::new(Statistic::Delta, 5, TimeUnit::Minute).unwrap();
        let query = SeriesQuery::new(&identity(), range, Some(&agg));
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["group"]["type"], "SUM");
        assert_eq!(json["aggregate"]["types"][0], "DELTA");
        assert_eq!(json["aggregate"]["interpolate"], "STEP");
    }

    #[test]
    fn test_series_response_decoding() {
        let body = r#"{"series": [{"requestId": "q3", "entity": "e", "data": [{"t": 1000, "v": 1.5}, {"t": 2000, "v": null}]}]}"#;
        let response: SeriesResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.series.len(), 1);
        assert_eq!(response.series[0].request_id.as_deref(), Some("q3"));
        assert_eq!(response.series[0].data[1].v, None);
    }

    #[test]
    fn test_metadata_decoding() {
        let metric: MetricInfo =
            serde_json::from_str(r#"{"name": "cpu_busy", "retentionDays": 30}"#).unwrap();
        assert_eq!(metric.retention_interval, Some(30));

        let combos: Vec<EntityTags> = serde_json::from_str(
            r#"[{"entity": "e1", "tags": {"mount": "/"}}, {"entity": "e2"}]"#,
        )
        .unwrap();
        assert_eq!(combos[0].tags["mount"], "/");
        assert!(combos[1].tags.is_empty());
    }
}
