use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::render::{ImageVariant, RenderJob, RenderStatus, UpscaleFactor};

/// Text fields of a render submission (the image arrives as its own multipart part).
#[derive(Debug, Deserialize, Validate)]
pub struct RenderRequest {
    #[garde(length(chars, min = 1, max = 2000))]
    pub prompt: String,

    #[garde(length(chars, min = 1, max = 100))]
    pub style: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpscaleRequest {
    #[garde(skip)]
    #[serde(default)]
    pub factor: UpscaleFactor,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListQuery {
    #[garde(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[garde(range(min = 0))]
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub variant: ImageVariant,
}

/// Response after a job (or an upscale of it) has been accepted.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: RenderStatus,
    pub message: String,
}

/// Job state as seen by a polling client.
#[derive(Debug, Serialize)]
pub struct RenderStatusResponse {
    pub job_id: Uuid,
    pub status: RenderStatus,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub has_render: bool,
    pub has_upscaled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale_factor: Option<UpscaleFactor>,
    /// Factor of the downloadable upscaled image, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscaled_factor: Option<UpscaleFactor>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Suggested delay before the next poll; absent once the job is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_after_ms: Option<u64>,
}

impl RenderStatusResponse {
    pub fn from_job(job: RenderJob, poll_interval_ms: u64) -> Self {
        let poll_after_ms = (!job.status.is_terminal()).then_some(poll_interval_ms);
        Self {
            job_id: job.id,
            status: job.status,
            has_render: job.render_key.is_some(),
            has_upscaled: job.upscaled_key.is_some(),
            upscale_factor: job.upscale_factor,
            upscaled_factor: job.upscaled_factor,
            prompt: job.prompt,
            style: job.style,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            poll_after_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RenderListResponse {
    pub renders: Vec<RenderStatusResponse>,
    pub total: i64,
}
