use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::polling::{poll_until, PollPolicy, PollStep};
use super::vendor::{self, VendorError};
use crate::models::render::UpscaleFactor;

/// Client for the task-style image upscaling API.
pub struct UpscaleClient {
    http: Client,
    base_url: String,
    api_key: String,
    policy: PollPolicy,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: UpscaleTask,
}

#[derive(Debug, Deserialize)]
pub struct UpscaleTask {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub generated: Vec<String>,
}

impl UpscaleTask {
    pub fn step(&self) -> PollStep<String> {
        match self.status.as_str() {
            "CREATED" | "IN_PROGRESS" => PollStep::Pending,
            "COMPLETED" => match self.generated.first() {
                Some(url) => PollStep::Ready(url.clone()),
                None => PollStep::Failed("Upscale completed without an output image".to_string()),
            },
            "FAILED" => PollStep::Failed("Upscaling failed".to_string()),
            other => PollStep::Failed(format!("Unknown upscale status: {}", other)),
        }
    }
}

impl UpscaleClient {
    pub fn new(base_url: &str, api_key: &str, policy: PollPolicy) -> Result<Self, VendorError> {
        Ok(Self {
            http: vendor::http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/ai/image-upscaler", self.base_url)
    }

    pub async fn create_task(
        &self,
        image: &[u8],
        factor: UpscaleFactor,
    ) -> Result<UpscaleTask, VendorError> {
        let body = json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
            "scale_factor": factor.to_string(),
            "optimized_for": "standard"
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let envelope: Envelope = vendor::ensure_success(response).await?.json().await?;
        Ok(envelope.data)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<UpscaleTask, VendorError> {
        let response = self
            .http
            .get(format!("{}/{}", self.endpoint(), task_id))
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let envelope: Envelope = vendor::ensure_success(response).await?.json().await?;
        Ok(envelope.data)
    }

    /// Poll a task until it finishes, returning the upscaled image URL.
    pub async fn await_task(&self, task: &UpscaleTask) -> Result<String, VendorError> {
        match task.step() {
            PollStep::Ready(url) => return Ok(url),
            PollStep::Failed(message) => return Err(VendorError::Rejected(message)),
            PollStep::Pending => {}
        }

        let task_id = task.task_id.as_str();
        let url = poll_until(self.policy, |attempt| async move {
            tracing::debug!(task_id = %task_id, attempt, "Checking upscale status");
            Ok::<_, VendorError>(self.get_task(task_id).await?.step())
        })
        .await?;

        Ok(url)
    }

    pub async fn fetch_output(&self, url: &str) -> Result<Vec<u8>, VendorError> {
        vendor::fetch_image(&self.http, url).await
    }
}
