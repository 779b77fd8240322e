use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus scrape endpoint (text exposition format).
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for the render pipeline's metrics.
pub fn describe() {
    metrics::describe_counter!("render_jobs_submitted_total", "Render jobs accepted by the API");
    metrics::describe_counter!("render_jobs_completed_total", "Render jobs that produced an image");
    metrics::describe_counter!("render_jobs_failed_total", "Render jobs that failed");
    metrics::describe_counter!("upscale_jobs_total", "Upscale tasks started by workers");
    metrics::describe_counter!("render_jobs_timed_out_total", "In-flight jobs failed by the stale sweep");
    metrics::describe_histogram!(
        "render_generation_seconds",
        "Time from pickup to stored render"
    );
    metrics::describe_histogram!("render_upscale_seconds", "Time from pickup to stored upscale");
    metrics::describe_gauge!("render_queue_depth", "Render tasks waiting in the queue");
}
