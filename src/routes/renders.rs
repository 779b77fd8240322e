use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::queries;
use crate::error::AppError;
use crate::models::api::{
    ImageQuery, ListQuery, RenderListResponse, RenderRequest, RenderStatusResponse,
    SubmitResponse, UpscaleRequest,
};
use crate::models::render::{ImageVariant, RenderStatus};
use crate::services::queue::RenderTask;
use crate::services::storage::image_key;

/// POST /api/v1/renders — upload a reference image and prompt.
pub async fn submit_render(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let mut upload: Option<Bytes> = None;
    let mut prompt: Option<String> = None;
    let mut style: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => upload = Some(field.bytes().await?),
            "prompt" => prompt = Some(field.text().await?),
            "style" => {
                let text = field.text().await?;
                style = Some(text).filter(|s| !s.trim().is_empty());
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("missing image field".to_string()))?;
    let request = RenderRequest {
        prompt: prompt.unwrap_or_default().trim().to_string(),
        style: style.map(|s| s.trim().to_string()),
    };
    request.validate()?;

    let format = image::guess_format(&upload).map_err(|_| AppError::UnsupportedMedia)?;

    let job_id = Uuid::new_v4();
    let reference_key = image_key(&user.user_id, job_id, ImageVariant::Reference);
    state
        .storage
        .upload(&reference_key, &state.cipher.seal(&upload)?)
        .await?;

    let job = queries::create_job(
        &state.db,
        job_id,
        &user.user_id,
        &request.prompt,
        request.style.as_deref(),
        &reference_key,
    )
    .await?;

    let task = RenderTask::Generate {
        job_id: job.id,
        user_id: user.user_id.clone(),
    };
    if let Err(e) = state.queue.enqueue(&task).await {
        queries::fail_job(&state.db, job.id, RenderStatus::Pending, "Could not schedule render")
            .await?;
        return Err(e.into());
    }

    metrics::counter!("render_jobs_submitted_total").increment(1);
    tracing::info!(
        job_id = %job.id,
        user_id = %user.user_id,
        format = ?format,
        bytes = upload.len(),
        "Render submitted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            status: job.status,
            message: "Render queued".to_string(),
        }),
    ))
}

/// GET /api/v1/renders — the caller's renders, newest first.
pub async fn list_renders(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<RenderListResponse>, AppError> {
    let Query(query) = query?;
    query.validate()?;

    let jobs = queries::list_jobs_for_user(&state.db, &user.user_id, query.limit, query.offset)
        .await?;
    let total = queries::count_jobs_for_user(&state.db, &user.user_id).await?;

    Ok(Json(RenderListResponse {
        renders: jobs
            .into_iter()
            .map(|job| RenderStatusResponse::from_job(job, state.poll_interval_ms))
            .collect(),
        total,
    }))
}

/// GET /api/v1/renders/{job_id} — polled by clients until the job is terminal.
pub async fn get_render(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<RenderStatusResponse>, AppError> {
    let job = queries::get_job_for_user(&state.db, job_id, &user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(RenderStatusResponse::from_job(job, state.poll_interval_ms)))
}

/// POST /api/v1/renders/{job_id}/upscale — queue an upscale of a finished render.
pub async fn request_upscale(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let request: UpscaleRequest = if body.is_empty() {
        UpscaleRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    request.validate()?;

    let job = queries::get_job_for_user(&state.db, job_id, &user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !queries::request_upscale(&state.db, job_id, &user.user_id, request.factor).await? {
        let reason = match job.status {
            RenderStatus::Completed if job.render_key.is_some() => {
                format!("Render is already upscaled at {}", request.factor)
            }
            RenderStatus::Completed | RenderStatus::Failed => {
                "Render has no finished image to upscale".to_string()
            }
            status => format!("Render is {}", status),
        };
        return Err(AppError::Conflict(reason));
    }

    let task = RenderTask::Upscale {
        job_id,
        user_id: user.user_id.clone(),
        factor: request.factor,
    };
    if let Err(e) = state.queue.enqueue(&task).await {
        queries::restore_after_upscale_failure(&state.db, job_id, "Could not schedule upscale")
            .await?;
        return Err(e.into());
    }

    tracing::info!(job_id = %job_id, factor = %request.factor, "Upscale requested");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: RenderStatus::Upscaling,
            message: format!("Upscale to {} queued", request.factor),
        }),
    ))
}

/// GET /api/v1/renders/{job_id}/image — decrypted image bytes for one variant.
pub async fn get_render_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let job = queries::get_job_for_user(&state.db, job_id, &user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let key = job.key_for(query.variant).ok_or(AppError::NotFound)?;

    let bytes = state.cipher.open(&state.storage.download(key).await?)?;
    let content_type = image::guess_format(&bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");

    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, "private, max-age=3600"),
        ],
        bytes,
    ))
}

/// DELETE /api/v1/renders/{job_id} — remove a finished job and its images.
pub async fn delete_render(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let job = queries::get_job_for_user(&state.db, job_id, &user.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if job.status.is_in_flight() || !queries::delete_job(&state.db, job_id, &user.user_id).await? {
        return Err(AppError::Conflict("Render is still in progress".to_string()));
    }

    for key in job.stored_keys() {
        if let Err(e) = state.storage.delete(key).await {
            tracing::warn!(job_id = %job_id, key = %key, error = %e, "Failed to delete stored image");
        }
    }

    tracing::info!(job_id = %job_id, user_id = %user.user_id, "Render deleted");
    Ok(StatusCode::NO_CONTENT)
}
