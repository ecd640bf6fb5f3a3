// src/storage/s3.rs

//! AWS S3 object storage for derived images.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::MediaConfig;
use crate::storage::ObjectStore;

/// S3-backed object store writing every object with a canned ACL.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    acl: ObjectCannedAcl,
}

impl S3ObjectStore {
    /// Create a new S3 object store instance.
    pub fn new(client: Client, bucket: impl Into<String>, acl: &str) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            acl: ObjectCannedAcl::from(acl),
        }
    }

    /// Create an S3 object store from the media configuration.
    ///
    /// Credentials come from the standard AWS provider chain.
    pub async fn from_config(config: &MediaConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::config("media.bucket is empty"));
        }

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let client = Client::new(&sdk_config);

        info!(bucket = %config.bucket, region = %config.region, "S3 object store ready");
        Ok(Self::new(client, config.bucket.clone(), &config.acl))
    }
}

fn content_type(key: &str) -> &'static str {
    match key.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(self.acl.clone())
            .content_type(content_type(key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::object_store(e.into_service_error()))?;

        debug!(bucket = %self.bucket, key, size, "Uploaded object");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("images/s_a.PNG"), "image/png");
        assert_eq!(content_type("images/a.jpg"), "image/jpeg");
        assert_eq!(content_type("images/a"), "application/octet-stream");
    }
}
