use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

use crate::models::render::ImageVariant;

/// Client for the S3-compatible bucket holding encrypted images.
pub struct ObjectStore {
    bucket: Box<Bucket>,
}

/// Object key for one image of a render job.
pub fn image_key(user_id: &str, job_id: Uuid, variant: ImageVariant) -> String {
    format!("users/{}/renders/{}/{}", user_id, job_id, variant)
}

impl ObjectStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }

    pub async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, "application/octet-stream")
            .await?;
        check_status(key, response.status_code())
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await?;
        check_status(key, response.status_code())?;
        Ok(response.bytes().to_vec())
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.bucket.delete_object(key).await?;
        match response.status_code() {
            // deleting something already gone is fine
            404 => Ok(()),
            code => check_status(key, code),
        }
    }
}

fn check_status(key: &str, code: u16) -> Result<(), StorageError> {
    match code {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        code => Err(StorageError::Status {
            key: key.to_string(),
            code,
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage returned status {code} for {key}")]
    Status { key: String, code: u16 },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_user_and_job() {
        let job = Uuid::nil();
        assert_eq!(
            image_key("user-9", job, ImageVariant::Upscaled),
            "users/user-9/renders/00000000-0000-0000-0000-000000000000/upscaled"
        );
        assert!(image_key("u", job, ImageVariant::Reference).ends_with("/reference"));
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert!(check_status("k", 204).is_ok());
        assert!(matches!(check_status("k", 404), Err(StorageError::NotFound(_))));
        assert!(matches!(
            check_status("k", 503),
            Err(StorageError::Status { code: 503, .. })
        ));
    }
}
