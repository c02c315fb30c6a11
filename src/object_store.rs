use crate::config::S3Config;
use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Object store request failure. Single attempt, no retry.
#[derive(Debug, Error)]
#[error("object store request failed")]
pub struct UploadError(#[source] anyhow::Error);

impl UploadError {
    pub(crate) fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(err.into())
    }
}

/// Uploader for the public media bucket
pub struct ObjectStore {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl ObjectStore {
    /// Create a new object store client
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Object store client initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
        })
    }

    /// Generate a collision-resistant object key: `{unix_seconds}_{uuid}.{ext}`.
    ///
    /// The timestamp keeps keys roughly sortable; uniqueness rests on the
    /// random component.
    pub fn generate_key(&self, extension: &str) -> String {
        format!(
            "{}_{}.{}",
            Utc::now().timestamp(),
            Uuid::new_v4(),
            extension.trim_start_matches('.').to_lowercase()
        )
    }

    /// Upload a byte buffer under the given key, returning its public URL
    #[instrument(skip(self, bytes), fields(key = %key, size_bytes = bytes.len()))]
    pub async fn put_bytes(&self, bytes: Vec<u8>, key: &str) -> Result<String, UploadError> {
        self.put(ByteStream::from(bytes), key).await
    }

    /// Upload a local file under the given key, returning its public URL
    #[instrument(skip(self, path), fields(key = %key))]
    pub async fn put_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
    ) -> Result<String, UploadError> {
        let body = ByteStream::from_path(path.as_ref())
            .await
            .map_err(UploadError::new)?;
        self.put(body, key).await
    }

    async fn put(&self, body: ByteStream, key: &str) -> Result<String, UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type("application/octet-stream")
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(UploadError::new)?;

        let url = self.public_url(key);
        debug!(key = %key, url = %url, "Object uploaded");

        Ok(url)
    }

    /// Delete an object. Used by the ingestion compensation path.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &str) -> Result<(), UploadError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(UploadError::new)?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }

    /// Public URL for a stored object
    pub fn public_url(&self, key: &str) -> String {
        match self.endpoint_url {
            Some(ref endpoint) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(endpoint_url: Option<String>) -> ObjectStore {
        ObjectStore::new(&S3Config {
            bucket: "media-test".to_string(),
            region: "ap-southeast-2".to_string(),
            endpoint_url,
            force_path_style: false,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_key_format() {
        let store = test_store(None).await;

        let key = store.generate_key("jpg");
        assert!(key.ends_with(".jpg"));

        let stem = key.strip_suffix(".jpg").unwrap();
        let (timestamp, uuid) = stem.split_once('_').unwrap();
        assert!(timestamp.parse::<i64>().is_ok());
        assert!(Uuid::parse_str(uuid).is_ok());
    }

    #[tokio::test]
    async fn test_generate_key_normalizes_extension() {
        let store = test_store(None).await;

        assert!(store.generate_key(".JPG").ends_with(".jpg"));
        assert!(store.generate_key("PNG").ends_with(".png"));
    }

    #[tokio::test]
    async fn test_generate_key_unique() {
        let store = test_store(None).await;
        assert_ne!(store.generate_key("jpg"), store.generate_key("jpg"));
    }

    #[tokio::test]
    async fn test_public_url_virtual_hosted() {
        let store = test_store(None).await;
        assert_eq!(
            store.public_url("123_abc.jpg"),
            "https://media-test.s3.ap-southeast-2.amazonaws.com/123_abc.jpg"
        );
    }

    #[tokio::test]
    async fn test_public_url_custom_endpoint() {
        let store = test_store(Some("http://localhost:9000/".to_string())).await;
        assert_eq!(
            store.public_url("123_abc.jpg"),
            "http://localhost:9000/media-test/123_abc.jpg"
        );
    }
}
