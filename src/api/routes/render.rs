//! Render Routes
//!
//! - GET /render?target=&from=&until= - Series data as Graphite JSON

use axum::{
    extract::{RawQuery, State},
    Json,
};
use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;

use crate::api::dto::{RenderParams, RenderSeries};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::api::timespec::parse_time;
use crate::finder::{FindQuery, Finder};
use crate::series::TimeRange;

const DEFAULT_FROM: &str = "-24h";
const DEFAULT_UNTIL: &str = "now";

/// GET /render
pub async fn render(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<Vec<RenderSeries>>> {
    let params = RenderParams::from_query(query.as_deref().unwrap_or_default())?;

    let now = Utc::now().timestamp_millis();
    let from = parse_time(params.from.as_deref().unwrap_or(DEFAULT_FROM), now)
        .map_err(ApiError::Validation)?;
    let until = parse_time(params.until.as_deref().unwrap_or(DEFAULT_UNTIL), now)
        .map_err(ApiError::Validation)?;
    let range = TimeRange::new(from, until)?;

    Ok(Json(render_targets(&state.finder, &params.targets, range).await))
}

/// Resolve every target and queue all fetches before awaiting any, so the
/// whole request goes out as one batch. Failed fetches are left out.
pub async fn render_targets(
    finder: &Finder,
    targets: &[String],
    range: TimeRange,
) -> Vec<RenderSeries> {
    let mut pending = Vec::new();
    for target in targets {
        for node in finder.find_nodes(&FindQuery::new(target.as_str())).await {
            if let Some(reader) = node.reader() {
                pending.push((node.path().to_string(), reader.fetch(range)));
            }
        }
    }
    tracing::debug!(series = pending.len(), start = range.start, end = range.end, "Rendering");

    let results = join_all(
        pending
            .into_iter()
            .map(|(path, fetch)| async move { (path, fetch.wait().await) }),
    )
    .await;

    results
        .into_iter()
        .filter_map(|(path, result)| match result {
            Ok(data) => Some(RenderSeries::new(path, &data)),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Fetch failed");
                None
            }
        })
        .collect()
}
