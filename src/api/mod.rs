//! Graphite-compatible HTTP API
//!
//! HTTP surface of the finder, built with Axum.
//!
//! # Endpoints
//!
//! - `GET /metrics/find?query=<pattern>` - Namespace nodes (tree JSON)
//! - `GET /render?target=<pattern>&from=&until=` - Series data (JSON)
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use atsd_finder::api::{serve, AppState};
//!
//! let state = AppState::new(finder, config.api.clone());
//! serve(state, &config.api).await?;
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
pub mod timespec;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    Router::new()
        .route("/metrics/find", get(routes::find::find_metrics))
        .route("/render", get(routes::render::render))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Permissive when no origins are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(allowed)
    }
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("ATSD finder listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("ATSD finder shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{FindNode, HealthResponse, RenderSeries};
    use crate::backend::fake::FakeBackend;
    use crate::finder::tests::backend;
    use crate::finder::{Finder, TreeSchema};
    use crate::reader::tests::context;
    use crate::retention::RetentionPolicy;
    use crate::series::Sample;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde::de::DeserializeOwned;
    use tower::util::ServiceExt;

    fn create_test_app(fake: Arc<FakeBackend>) -> Router {
        let finder = Finder::new(
            TreeSchema::default(),
            Vec::new(),
            context(fake, RetentionPolicy::empty()),
        )
        .unwrap();
        build_router(AppState::new(Arc::new(finder), ApiConfig::default()))
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app(Arc::new(backend()));
        let response = get(app, "/health/live").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let app = create_test_app(Arc::new(backend()));
        let health: HealthResponse = json(get(app, "/health").await).await;
        assert_eq!(health.status, "healthy");

        let failing = Arc::new(FakeBackend {
            fail_metadata: true,
            ..backend()
        });
        let health: HealthResponse = json(get(create_test_app(failing), "/health").await).await;
        assert_eq!(health.atsd, "error");
    }

    #[tokio::test]
    async fn test_find() {
        let app = create_test_app(Arc::new(backend()));
        let response = get(app, "/metrics/find?query=entities.n.*").await;
        assert_eq!(response.status(), StatusCode::OK);

        let nodes: Vec<FindNode> = json(response).await;
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, "entities.n.nurswgvml007");
        assert_eq!(nodes[0].text, "nurswgvml007");
        assert_eq!(nodes[0].leaf, 0);
        assert_eq!(nodes[0].expandable, 1);
    }

    #[tokio::test]
    async fn test_find_malformed_pattern() {
        let app = create_test_app(Arc::new(backend()));
        let response = get(app, "/metrics/find?query=entities.n.e.m.nonsense").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_render_batches_all_targets() {
        let fake = Arc::new(
            backend().with_samples(vec![Sample::new(60_000, 1.0), Sample::new(120_000, 2.0)]),
        );
        let app = create_test_app(fake.clone());

        let response = get(
            app,
            "/render?target=entities.n.*.cpu_busy.detail&target=entities.a.atsd.cpu_busy.detail&from=0&until=600",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let series: Vec<RenderSeries> = json(response).await;
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].target, "entities.n.nurswgvml007.cpu_busy.detail");
        assert_eq!(series[0].datapoints, vec![(Some(1.0), 60), (Some(2.0), 120)]);
        assert_eq!(fake.series_calls(), 1);
    }

    #[tokio::test]
    async fn test_render_drops_failed_series() {
        let fake = Arc::new(FakeBackend {
            fail_series: true,
            ..backend()
        });
        let app = create_test_app(fake);

        let response = get(
            app,
            "/render?target=entities.n.nurswgvml007.cpu_busy.detail&from=0&until=600",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let series: Vec<RenderSeries> = json(response).await;
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_render_rejects_bad_times() {
        let app = create_test_app(Arc::new(backend()));
        let response = get(app.clone(), "/render?target=x&from=yesterday").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(app, "/render?target=x&from=600&until=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
