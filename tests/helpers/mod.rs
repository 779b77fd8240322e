//! Client-side helpers for end-to-end runs against a deployed API.

use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Response from POST /api/v1/renders
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
}

/// Response from GET /api/v1/renders/{job_id}
#[derive(Debug, Deserialize)]
pub struct RenderStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub has_render: bool,
    pub has_upscaled: bool,
    pub error: Option<String>,
    pub poll_after_ms: Option<u64>,
}

pub async fn submit_render(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    image: Vec<u8>,
    prompt: &str,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let form = multipart::Form::new()
        .part(
            "image",
            multipart::Part::bytes(image)
                .file_name("reference.png")
                .mime_str("image/png")?,
        )
        .text("prompt", prompt.to_string());

    let response = client
        .post(format!("{}/api/v1/renders", base_url))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json().await?)
}

pub async fn request_upscale(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    job_id: Uuid,
    factor: &str,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/renders/{}/upscale", base_url, job_id))
        .bearer_auth(token)
        .json(&serde_json::json!({ "factor": factor }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("Upscale request failed: {}", response.text().await?).into());
    }

    Ok(response.json().await?)
}

/// Poll the status endpoint the way the web client does: a fixed interval and
/// a bounded number of attempts. Returns the first `completed` or `failed` state.
pub async fn poll_render(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    job_id: Uuid,
    max_attempts: u32,
) -> Result<RenderStatusResponse, Box<dyn std::error::Error>> {
    for attempt in 1..=max_attempts {
        let response = client
            .get(format!("{}/api/v1/renders/{}", base_url, job_id))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Status check failed: {}", response.text().await?).into());
        }

        let status: RenderStatusResponse = response.json().await?;
        match status.status.as_str() {
            "completed" | "failed" => return Ok(status),
            "pending" | "processing" | "upscaling" => {
                if attempt % 10 == 0 {
                    println!("  ... still {} (attempt {}/{})", status.status, attempt, max_attempts);
                }
                let wait = status.poll_after_ms.unwrap_or(2500);
                sleep(Duration::from_millis(wait)).await;
            }
            other => return Err(format!("Unknown render status: {}", other).into()),
        }
    }

    Err(format!("Render did not finish within {} polls", max_attempts).into())
}
