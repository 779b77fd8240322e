use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod renders;

/// Build the HTTP API.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/renders",
            post(renders::submit_render).get(renders::list_renders),
        )
        .route(
            "/api/v1/renders/{job_id}",
            get(renders::get_render).delete(renders::delete_render),
        )
        .route("/api/v1/renders/{job_id}/upscale", post(renders::request_upscale))
        .route("/api/v1/renders/{job_id}/image", get(renders::get_render_image))
        .with_state(state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        // headroom for multipart framing around the image
        .layer(RequestBodyLimitLayer::new(max_upload_bytes + 64 * 1024))
}
