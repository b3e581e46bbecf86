use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;

/// How long an evidence upload URL stays valid.
pub const EVIDENCE_URL_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("failed to presign upload: {0}")]
    Presign(String),
}

/// Object storage for alert evidence.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Whether the evidence bucket exists and is reachable.
    async fn is_ready(&self) -> bool;

    /// Presigned PUT URL for a direct client upload to `key`.
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, EvidenceError>;
}

pub struct S3EvidenceStore {
    client: S3Client,
    bucket: String,
}

impl S3EvidenceStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl EvidenceStore for S3EvidenceStore {
    async fn is_ready(&self) -> bool {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(bucket = %self.bucket, error = ?e, "Evidence bucket not reachable");
                false
            }
        }
    }

    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, EvidenceError> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| EvidenceError::Presign(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .presigned(config)
            .await
            .map_err(|e| EvidenceError::Presign(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// Object key for one alert's evidence file.
pub fn evidence_key(user_id: &str, alert_id: &str, extension: &str) -> String {
    format!("evidence/{}/{}.{}", user_id, alert_id, extension)
}

/// Content type announced for an evidence upload, from its extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
