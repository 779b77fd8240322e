use std::time::Instant;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::render::{ImageVariant, RenderStatus, UpscaleFactor};
use crate::services::encryption::EncryptionError;
use crate::services::generation::compose_prompt;
use crate::services::storage::{image_key, StorageError};
use crate::services::vendor::VendorError;

/// Generate a render for a pending job and persist the outcome on its row.
pub async fn run_generation(state: &AppState, job_id: Uuid) -> Result<(), PipelineError> {
    if !queries::transition(&state.db, job_id, RenderStatus::Pending, RenderStatus::Processing)
        .await?
    {
        tracing::warn!(job_id = %job_id, "Job is no longer pending, skipping generation");
        return Ok(());
    }

    let start = Instant::now();
    match generate(state, job_id).await {
        Ok(render_key) => {
            if !queries::complete_render(&state.db, job_id, &render_key).await? {
                tracing::warn!(job_id = %job_id, "Job left processing before the render finished");
                if let Err(e) = state.storage.delete(&render_key).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to remove orphaned render");
                }
                return Ok(());
            }
            metrics::histogram!("render_generation_seconds").record(start.elapsed().as_secs_f64());
            metrics::counter!("render_jobs_completed_total").increment(1);
            tracing::info!(
                job_id = %job_id,
                duration_ms = start.elapsed().as_millis() as u64,
                "Render completed"
            );
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(job_id = %job_id, error = %message, "Render failed");
            queries::fail_job(&state.db, job_id, RenderStatus::Processing, &message).await?;
            metrics::counter!("render_jobs_failed_total").increment(1);
        }
    }

    Ok(())
}

async fn generate(state: &AppState, job_id: Uuid) -> Result<String, PipelineError> {
    let job = queries::get_job(&state.db, job_id)
        .await?
        .ok_or(PipelineError::Missing(job_id))?;

    tracing::debug!(job_id = %job_id, "Loading reference image");
    let reference = state.cipher.open(&state.storage.download(&job.reference_key).await?)?;

    let prompt = compose_prompt(&job.prompt, job.style.as_deref());
    let prediction = state.generation.create_prediction(&reference, &prompt).await?;
    queries::set_generation_id(&state.db, job_id, &prediction.id).await?;
    tracing::info!(job_id = %job_id, prediction_id = %prediction.id, "Generation started");

    let output_url = state.generation.await_prediction(&prediction).await?;
    let render = state.generation.fetch_output(&output_url).await?;

    let key = image_key(&job.user_id, job_id, ImageVariant::Render);
    state.storage.upload(&key, &state.cipher.seal(&render)?).await?;
    Ok(key)
}

/// Upscale a job's render. On failure the job returns to `completed` with the error recorded.
pub async fn run_upscale(
    state: &AppState,
    job_id: Uuid,
    factor: UpscaleFactor,
) -> Result<(), PipelineError> {
    let start = Instant::now();
    metrics::counter!("upscale_jobs_total").increment(1);

    match upscale(state, job_id, factor).await {
        Ok(upscaled_key) => {
            if !queries::complete_upscale(&state.db, job_id, &upscaled_key).await? {
                tracing::warn!(job_id = %job_id, "Job left upscaling before the upscale finished");
                return Ok(());
            }
            metrics::histogram!("render_upscale_seconds").record(start.elapsed().as_secs_f64());
            tracing::info!(
                job_id = %job_id,
                factor = %factor,
                duration_ms = start.elapsed().as_millis() as u64,
                "Upscale completed"
            );
        }
        Err(e) => {
            let message = format!("Upscale failed: {}", e);
            tracing::error!(job_id = %job_id, error = %message, "Upscale failed");
            queries::restore_after_upscale_failure(&state.db, job_id, &message).await?;
        }
    }

    Ok(())
}

async fn upscale(
    state: &AppState,
    job_id: Uuid,
    factor: UpscaleFactor,
) -> Result<String, PipelineError> {
    let job = queries::get_job(&state.db, job_id)
        .await?
        .ok_or(PipelineError::Missing(job_id))?;

    if job.status != RenderStatus::Upscaling {
        return Err(PipelineError::WrongStatus(job.status));
    }
    let render_key = job.render_key.as_deref().ok_or(PipelineError::NoRender)?;

    let render = state.cipher.open(&state.storage.download(render_key).await?)?;

    let task = state.upscale.create_task(&render, factor).await?;
    queries::set_upscale_task_id(&state.db, job_id, &task.task_id).await?;
    tracing::info!(job_id = %job_id, task_id = %task.task_id, "Upscale started");

    let output_url = state.upscale.await_task(&task).await?;
    let upscaled = state.upscale.fetch_output(&output_url).await?;

    let key = image_key(&job.user_id, job_id, ImageVariant::Upscaled);
    state.storage.upload(&key, &state.cipher.seal(&upscaled)?).await?;
    Ok(key)
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Render job {0} not found")]
    Missing(Uuid),

    #[error("Render job is {0}")]
    WrongStatus(RenderStatus),

    #[error("Render job has no finished render to upscale")]
    NoRender,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Vendor(#[from] VendorError),
}
