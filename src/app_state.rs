use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    encryption::ImageCipher, generation::GenerationClient, polling::PollPolicy,
    queue::RenderQueue, storage::ObjectStore, upscale::UpscaleClient,
};

/// Shared state passed to route handlers and the worker pipeline.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<ObjectStore>,
    pub cipher: Arc<ImageCipher>,
    pub queue: Arc<RenderQueue>,
    pub generation: Arc<GenerationClient>,
    pub upscale: Arc<UpscaleClient>,
    pub auth: Arc<AuthSettings>,
    pub poll_interval_ms: u64,
}

/// What the bearer-token extractor needs to verify session tokens.
pub struct AuthSettings {
    pub jwt_secret: String,
    pub audience: Option<String>,
}

impl AppState {
    /// Build every client from configuration. Nothing here opens a connection.
    pub fn from_config(config: &AppConfig, db: PgPool) -> Result<Self, crate::error::InitError> {
        let storage = ObjectStore::new(
            &config.s3_bucket,
            &config.s3_endpoint,
            &config.s3_region,
            &config.s3_access_key,
            &config.s3_secret_key,
        )?;
        let cipher = ImageCipher::from_base64_key(&config.encryption_key)?;
        let queue = RenderQueue::new(&config.redis_url)?;

        let policy = PollPolicy::new(config.poll_interval(), config.render_poll_max_attempts);
        let generation = GenerationClient::new(
            &config.generation_api_url,
            &config.generation_api_token,
            &config.generation_model_version,
            policy,
        )?;
        let upscale = UpscaleClient::new(&config.upscale_api_url, &config.upscale_api_key, policy)?;

        Ok(Self {
            db,
            storage: Arc::new(storage),
            cipher: Arc::new(cipher),
            queue: Arc::new(queue),
            generation: Arc::new(generation),
            upscale: Arc::new(upscale),
            auth: Arc::new(AuthSettings {
                jwt_secret: config.auth_jwt_secret.clone(),
                audience: config.auth_jwt_audience.clone(),
            }),
            poll_interval_ms: config.render_poll_interval_ms,
        })
    }
}
