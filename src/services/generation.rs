use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::polling::{poll_until, PollPolicy, PollStep};
use super::vendor::{self, VendorError};

const PHOTOREAL_SUFFIX: &str =
    "photorealistic interior render, natural lighting, high detail, 8k, architectural photography";

/// Client for the prediction-style image generation API.
pub struct GenerationClient {
    http: Client,
    base_url: String,
    api_token: String,
    model_version: String,
    policy: PollPolicy,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// Map the vendor's status onto a polling step.
    pub fn step(&self) -> PollStep<String> {
        match self.status.as_str() {
            "starting" | "processing" => PollStep::Pending,
            "succeeded" => match self.output_url() {
                Some(url) => PollStep::Ready(url),
                None => PollStep::Failed("Generation succeeded without an output image".to_string()),
            },
            "canceled" => PollStep::Failed("Generation was canceled".to_string()),
            "failed" => PollStep::Failed(self.error_message()),
            other => PollStep::Failed(format!("Unknown generation status: {}", other)),
        }
    }

    /// Output is either a single URL or a list of URLs.
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(message)) if !message.is_empty() => message.clone(),
            Some(Value::Null) | None => "Generation failed".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Final text prompt sent to the model.
pub fn compose_prompt(prompt: &str, style: Option<&str>) -> String {
    let prompt = prompt.trim();
    match style.map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) => format!("{}, {} style, {}", prompt, style, PHOTOREAL_SUFFIX),
        None => format!("{}, {}", prompt, PHOTOREAL_SUFFIX),
    }
}

impl GenerationClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        model_version: &str,
        policy: PollPolicy,
    ) -> Result<Self, VendorError> {
        Ok(Self {
            http: vendor::http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            model_version: model_version.to_string(),
            policy,
        })
    }

    /// Start a prediction for a reference image and prompt.
    pub async fn create_prediction(
        &self,
        reference: &[u8],
        prompt: &str,
    ) -> Result<Prediction, VendorError> {
        let body = json!({
            "version": self.model_version,
            "input": {
                "image": vendor::image_data_uri(reference)?,
                "prompt": prompt,
                "num_outputs": 1
            }
        });

        let response = self
            .http
            .post(format!("{}/v1/predictions", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        Ok(vendor::ensure_success(response).await?.json().await?)
    }

    pub async fn get_prediction(&self, id: &str) -> Result<Prediction, VendorError> {
        let response = self
            .http
            .get(format!("{}/v1/predictions/{}", self.base_url, id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        Ok(vendor::ensure_success(response).await?.json().await?)
    }

    /// Poll a prediction until it finishes, returning the output image URL.
    pub async fn await_prediction(&self, prediction: &Prediction) -> Result<String, VendorError> {
        // the create response may already be terminal
        match prediction.step() {
            PollStep::Ready(url) => return Ok(url),
            PollStep::Failed(message) => return Err(VendorError::Rejected(message)),
            PollStep::Pending => {}
        }

        let id = prediction.id.as_str();
        let url = poll_until(self.policy, |attempt| async move {
            tracing::debug!(prediction_id = %id, attempt, "Checking generation status");
            Ok::<_, VendorError>(self.get_prediction(id).await?.step())
        })
        .await?;

        Ok(url)
    }

    pub async fn fetch_output(&self, url: &str) -> Result<Vec<u8>, VendorError> {
        vendor::fetch_image(&self.http, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(status: &str, output: Option<Value>, error: Option<Value>) -> Prediction {
        Prediction {
            id: "p1".to_string(),
            status: status.to_string(),
            output,
            error,
        }
    }

    #[test]
    fn running_statuses_are_pending() {
        assert_eq!(prediction("starting", None, None).step(), PollStep::Pending);
        assert_eq!(prediction("processing", None, None).step(), PollStep::Pending);
    }

    #[test]
    fn output_may_be_string_or_list() {
        let single = prediction("succeeded", Some(json!("https://cdn/x.png")), None);
        assert_eq!(single.step(), PollStep::Ready("https://cdn/x.png".to_string()));

        let list = prediction("succeeded", Some(json!(["https://cdn/a.png", "https://cdn/b.png"])), None);
        assert_eq!(list.step(), PollStep::Ready("https://cdn/a.png".to_string()));

        let empty = prediction("succeeded", Some(json!([])), None);
        assert!(matches!(empty.step(), PollStep::Failed(_)));
    }

    #[test]
    fn vendor_error_message_is_surfaced() {
        let failed = prediction("failed", None, Some(json!("CUDA out of memory")));
        assert_eq!(failed.step(), PollStep::Failed("CUDA out of memory".to_string()));

        let bare = prediction("failed", None, Some(Value::Null));
        assert_eq!(bare.step(), PollStep::Failed("Generation failed".to_string()));

        assert!(matches!(prediction("canceled", None, None).step(), PollStep::Failed(_)));
    }

    #[test]
    fn prompt_gets_style_and_suffix() {
        assert_eq!(
            compose_prompt("  bright kitchen ", Some("japandi")),
            format!("bright kitchen, japandi style, {}", PHOTOREAL_SUFFIX)
        );
        assert_eq!(
            compose_prompt("bedroom", Some("  ")),
            format!("bedroom, {}", PHOTOREAL_SUFFIX)
        );
    }
}
