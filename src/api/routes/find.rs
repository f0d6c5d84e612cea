//! Find Routes
//!
//! - GET /metrics/find?query= - List namespace nodes matching a pattern

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{FindNode, FindParams};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::finder::FindQuery;

/// GET /metrics/find
///
/// Malformed patterns are rejected; failing branches are left out.
pub async fn find_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FindParams>,
) -> ApiResult<Json<Vec<FindNode>>> {
    let nodes = state.finder.resolve(&FindQuery::new(params.query)).await?;
    Ok(Json(nodes.iter().map(FindNode::from).collect()))
}
