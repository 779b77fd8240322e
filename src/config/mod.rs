use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus scrape address for the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the render task queue
    pub redis_url: String,

    /// Object storage bucket name
    pub s3_bucket: String,

    /// Object storage endpoint URL (S3-compatible)
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// AES-256-GCM encryption key (base64-encoded, 32 bytes)
    pub encryption_key: String,

    /// HS256 secret shared with the auth provider that issues session tokens
    pub auth_jwt_secret: String,

    /// Expected `aud` claim; audience is not checked when unset
    #[serde(default)]
    pub auth_jwt_audience: Option<String>,

    #[serde(default = "default_generation_api_url")]
    pub generation_api_url: String,

    pub generation_api_token: String,

    /// Model version identifier passed with every prediction
    pub generation_model_version: String,

    #[serde(default = "default_upscale_api_url")]
    pub upscale_api_url: String,

    pub upscale_api_key: String,

    /// Delay between vendor status checks, also suggested to polling clients
    #[serde(default = "default_poll_interval_ms")]
    pub render_poll_interval_ms: u64,

    /// Vendor status checks before a job is given up on
    #[serde(default = "default_poll_max_attempts")]
    pub render_poll_max_attempts: u32,

    /// In-flight jobs untouched for this long are failed by the worker sweep
    #[serde(default = "default_stale_job_timeout_secs")]
    pub stale_job_timeout_secs: u64,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_generation_api_url() -> String {
    "https://api.replicate.com".to_string()
}

fn default_upscale_api_url() -> String {
    "https://api.freepik.com".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2500
}

fn default_poll_max_attempts() -> u32 {
    120
}

fn default_stale_job_timeout_secs() -> u64 {
    900
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.render_poll_interval_ms)
    }

    pub fn stale_job_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_job_timeout_secs)
    }
}
