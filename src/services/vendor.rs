//! Pieces shared by the generation and upscaling vendor clients.

use base64::Engine;
use reqwest::{Client, Response};
use std::time::Duration;

use super::polling::PollError;

const HTTP_TIMEOUT_SECS: u64 = 60;

pub(crate) fn http_client() -> Result<Client, VendorError> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(VendorError::Http)
}

/// `data:` URI for an image, with the MIME type sniffed from its bytes.
pub fn image_data_uri(image: &[u8]) -> Result<String, VendorError> {
    let format = image::guess_format(image).map_err(|_| VendorError::UnsupportedImage)?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        base64::engine::general_purpose::STANDARD.encode(image)
    ))
}

/// Turn a non-2xx vendor response into an error carrying its body.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, VendorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VendorError::Status {
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

/// Download a finished output image.
pub(crate) async fn fetch_image(http: &Client, url: &str) -> Result<Vec<u8>, VendorError> {
    let response = ensure_success(http.get(url).send().await?).await?;
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(VendorError::Malformed("output image is empty".to_string()));
    }
    Ok(bytes.to_vec())
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vendor returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected vendor response: {0}")]
    Malformed(String),

    #[error("Image format not recognised")]
    UnsupportedImage,

    #[error("{0}")]
    Rejected(String),

    #[error("Timed out after {attempts} status checks")]
    TimedOut { attempts: u32 },
}

impl From<PollError<VendorError>> for VendorError {
    fn from(err: PollError<VendorError>) -> Self {
        match err {
            PollError::Failed(message) => VendorError::Rejected(message),
            PollError::TimedOut { attempts } => VendorError::TimedOut { attempts },
            PollError::Check(inner) => inner,
        }
    }
}
