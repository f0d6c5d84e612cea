//! Health Routes
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Full health status, including ATSD reachability

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let metadata = &state.finder.context().metadata;
    let atsd_ok = match metadata.backend().health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "ATSD health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if atsd_ok { "healthy" } else { "degraded" }.to_string(),
        atsd: if atsd_ok { "ok" } else { "error" }.to_string(),
        cached_entries: metadata.len(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
