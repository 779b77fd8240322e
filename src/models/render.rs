use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a render job row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RenderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Upscaling,
}

impl RenderStatus {
    /// Whether a job may move from `self` to `next`.
    pub fn can_transition_to(self, next: RenderStatus) -> bool {
        use RenderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Upscaling)
                | (Upscaling, Completed)
                | (Upscaling, Failed)
        )
    }

    /// Clients stop polling once a job reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Completed | RenderStatus::Failed)
    }

    /// A background task currently owns the row.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            RenderStatus::Pending | RenderStatus::Processing | RenderStatus::Upscaling
        )
    }
}

/// Upscale multiplier understood by the upscaling vendor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
pub enum UpscaleFactor {
    #[default]
    #[serde(rename = "2x")]
    #[strum(to_string = "2x")]
    X2,
    #[serde(rename = "4x")]
    #[strum(to_string = "4x")]
    X4,
    #[serde(rename = "8x")]
    #[strum(to_string = "8x")]
    X8,
}

/// A render job as persisted in `render_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: Uuid,
    pub user_id: String,
    pub status: RenderStatus,
    pub prompt: String,
    pub style: Option<String>,
    pub reference_key: String,
    pub render_key: Option<String>,
    pub upscaled_key: Option<String>,
    /// Factor of the most recent upscale request.
    pub upscale_factor: Option<UpscaleFactor>,
    /// Factor of the image stored under `upscaled_key`.
    pub upscaled_factor: Option<UpscaleFactor>,
    pub generation_id: Option<String>,
    pub upscale_task_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
}

/// Which stored image of a job to read back.
#[derive(Debug, Clone, Copy, Default, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageVariant {
    Reference,
    #[default]
    Render,
    Upscaled,
}

impl RenderJob {
    /// Storage key for the requested variant, if that image exists yet.
    pub fn key_for(&self, variant: ImageVariant) -> Option<&str> {
        match variant {
            ImageVariant::Reference => Some(self.reference_key.as_str()),
            ImageVariant::Render => self.render_key.as_deref(),
            ImageVariant::Upscaled => self.upscaled_key.as_deref(),
        }
    }

    /// Every object this job has written to storage.
    pub fn stored_keys(&self) -> Vec<&str> {
        [
            Some(self.reference_key.as_str()),
            self.render_key.as_deref(),
            self.upscaled_key.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
