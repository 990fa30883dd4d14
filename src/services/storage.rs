use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

use crate::models::style::StylePreset;

/// Object key for one styled artifact. Keys are namespaced under `jobs/` so
/// a bucket lifecycle rule can reap abandoned output without touching
/// anything else.
pub fn artifact_key(job_id: Uuid, style: StylePreset, index: usize) -> String {
    format!("jobs/{job_id}/{style}/{index}.png")
}

/// Where styled artifacts end up. The worker only ever writes and expects a
/// publicly reachable URL back.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload bytes under `key` and return the public URL they are served at.
    async fn put_public(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Verify the store is reachable and the bucket exists.
    async fn healthcheck(&self) -> Result<(), StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL an uploaded key is served at via the bucket's public hostname.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Download object bytes. Mostly useful for connectivity checks.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn put_public(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        tracing::debug!(key, bytes = data.len(), "uploaded artifact");
        Ok(self.public_url(key))
    }

    async fn healthcheck(&self) -> Result<(), StorageError> {
        if self.bucket.exists().await.map_err(StorageError::S3)? {
            Ok(())
        } else {
            Err(StorageError::BucketMissing(self.bucket.name()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("bucket {0} does not exist")]
    BucketMissing(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
