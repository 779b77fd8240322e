use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::render::UpscaleFactor;

const QUEUE_KEY: &str = "renderz:tasks";
const PROCESSING_KEY: &str = "renderz:processing";

/// Task payload serialized into Redis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderTask {
    Generate {
        job_id: Uuid,
        user_id: String,
    },
    Upscale {
        job_id: Uuid,
        user_id: String,
        factor: UpscaleFactor,
    },
}

impl RenderTask {
    pub fn job_id(&self) -> Uuid {
        match self {
            RenderTask::Generate { job_id, .. } | RenderTask::Upscale { job_id, .. } => *job_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            RenderTask::Generate { user_id, .. } | RenderTask::Upscale { user_id, .. } => user_id,
        }
    }
}

/// Redis list queue feeding the render worker.
pub struct RenderQueue {
    client: redis::Client,
}

impl RenderQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn enqueue(&self, task: &RenderTask) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(task)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    /// Pop the oldest task, parking it on the processing list until `complete`.
    pub async fn dequeue(&self) -> Result<Option<RenderTask>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    pub async fn complete(&self, task: &RenderTask) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(task)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    /// Tasks popped by a worker but never completed.
    pub async fn in_flight(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.llen(PROCESSING_KEY).await?;
        Ok(count)
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
