use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use renderz::{
    app_state::AppState,
    config::AppConfig,
    db::{self, queries},
    routes,
    services::{pipeline, queue::RenderTask},
};

const IDLE_SLEEP_MS: u64 = 1000;
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting render worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    routes::metrics::describe();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let state = AppState::from_config(&config, db_pool).expect("Failed to initialize services");

    match state.queue.in_flight().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(in_flight = n, "Tasks left over from a previous worker run"),
        Err(e) => tracing::warn!(error = %e, "Could not inspect in-flight tasks"),
    }

    tracing::info!("Worker ready, starting task loop");

    let stale_timeout = config.stale_job_timeout();
    let mut last_sweep: Option<Instant> = None;

    loop {
        if last_sweep.map_or(true, |t| t.elapsed() >= STALE_SWEEP_INTERVAL) {
            sweep_stale_jobs(&state, stale_timeout).await;
            last_sweep = Some(Instant::now());
        }

        match process_next_task(&state).await {
            Ok(true) => {
                tracing::debug!("Task processed, checking for next task");
            }
            Ok(false) => {
                tracing::trace!("No tasks available, sleeping");
                sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing task");
                sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
        }
    }
}

/// Run the next queued task. Returns Ok(false) when the queue is empty.
async fn process_next_task(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let task = match state.queue.dequeue().await? {
        Some(task) => task,
        None => return Ok(false),
    };

    tracing::info!(job_id = %task.job_id(), user_id = %task.user_id(), "Processing task");

    let outcome = match &task {
        RenderTask::Generate { job_id, .. } => pipeline::run_generation(state, *job_id).await,
        RenderTask::Upscale { job_id, factor, .. } => {
            pipeline::run_upscale(state, *job_id, *factor).await
        }
    };

    // The job row records vendor failures; the task is finished either way.
    state.queue.complete(&task).await?;
    outcome?;

    Ok(true)
}

async fn sweep_stale_jobs(state: &AppState, timeout: Duration) {
    match queries::fail_stale_jobs(&state.db, timeout).await {
        Ok(ids) if ids.is_empty() => {}
        Ok(ids) => {
            metrics::counter!("render_jobs_timed_out_total").increment(ids.len() as u64);
            for id in &ids {
                tracing::warn!(job_id = %id, "Timed out stale render job");
            }
        }
        Err(e) => tracing::error!(error = %e, "Stale job sweep failed"),
    }
}
