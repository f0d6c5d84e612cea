//! Data Transfer Objects
//!
//! Request and response types for the API endpoints, shaped like the
//! Graphite web API so existing front ends can talk to the finder.

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::finder::Node;
use crate::series::SeriesData;

// ============================================
// FIND DTOs
// ============================================

/// `GET /metrics/find` parameters
#[derive(Debug, Deserialize)]
pub struct FindParams {
    /// Dotted find pattern
    pub query: String,
}

/// One node in Graphite's tree JSON format
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FindNode {
    /// Last path segment, decoded
    pub text: String,
    /// Full quoted path
    pub id: String,
    pub leaf: u8,
    pub expandable: u8,
    pub allow_children: u8,
}

impl From<&Node> for FindNode {
    fn from(node: &Node) -> Self {
        let branch = u8::from(!node.is_leaf());
        Self {
            text: node.label().to_string(),
            id: node.path().to_string(),
            leaf: u8::from(node.is_leaf()),
            expandable: branch,
            allow_children: branch,
        }
    }
}

// ============================================
// RENDER DTOs
// ============================================

/// `GET /render` parameters; `target` may repeat
#[derive(Debug, PartialEq)]
pub struct RenderParams {
    pub targets: Vec<String>,
    pub from: Option<String>,
    pub until: Option<String>,
}

impl RenderParams {
    /// Parse a raw query string
    pub fn from_query(query: &str) -> ApiResult<Self> {
        let mut params = RenderParams {
            targets: Vec::new(),
            from: None,
            until: None,
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(&raw.replace('+', " "))
                .map_err(|e| ApiError::Validation(format!("parameter '{}': {}", key, e)))?
                .into_owned();

            match key {
                "target" => params.targets.push(value),
                "from" => params.from = Some(value),
                "until" => params.until = Some(value),
                _ => {}
            }
        }

        if params.targets.is_empty() {
            return Err(ApiError::Validation("no target given".to_string()));
        }
        Ok(params)
    }
}

/// One rendered series: `[value, unix seconds]` pairs
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RenderSeries {
    pub target: String,
    pub datapoints: Vec<(Option<f64>, i64)>,
}

impl RenderSeries {
    pub fn new(target: impl Into<String>, data: &SeriesData) -> Self {
        Self {
            target: target.into(),
            datapoints: data.datapoints(),
        }
    }
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// "ok" or "error"
    pub atsd: String,
    /// Live metadata cache entries
    pub cached_entries: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeInfo;

    #[test]
    fn test_render_params() {
        let params = RenderParams::from_query(
            "target=entities.a.*.cpu_busy.detail&target=metrics.c.cpu%5Fbusy.*&from=-2h&until=now",
        )
        .unwrap();
        assert_eq!(
            params.targets,
            vec!["entities.a.*.cpu_busy.detail", "metrics.c.cpu_busy.*"]
        );
        assert_eq!(params.from.as_deref(), Some("-2h"));
        assert_eq!(params.until.as_deref(), Some("now"));

        assert!(RenderParams::from_query("from=-2h").is_err());
    }

    #[test]
    fn test_render_series_in_seconds() {
        let data = SeriesData {
            time_info: TimeInfo {
                start: 60_000,
                end: 180_000,
                step: 60_000,
            },
            values: vec![Some(1.0), None],
        };
        let series = RenderSeries::new("x", &data);
        assert_eq!(series.datapoints, vec![(Some(1.0), 60), (None, 120)]);
    }
}
