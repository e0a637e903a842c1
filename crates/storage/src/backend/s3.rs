//! S3-compatible storage backend.
//!
//! Works against AWS S3 and S3-compatible services (Backblaze B2, Tigris,
//! MinIO, …). Credentials are provided explicitly via configuration rather
//! than the SDK credential chain, since non-AWS providers use plain key
//! pairs.

use crate::backend::FileStore;
use crate::error::{ErrorKind, Result};
use crate::path::{validate as validate_path, validate_bucket};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use exn::{OptionExt, ResultExt};
use std::path::Path;

/// S3-compatible storage backend.
///
/// Saved bundles are addressed with virtual-hosted-style HTTPS URLs for AWS,
/// or `{endpoint}/{bucket}/{key}` path-style URLs when a custom endpoint is
/// configured.
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    region: String,
    endpoint: Option<String>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` / `key_secret` - provider access key pair
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "drydock-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // Exponential backoff: 1 initial attempt + 3 retries.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for compatibility with non-AWS services.
            .force_path_style(true);
        if let Some(endpoint) = &endpoint {
            config_builder = config_builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(config_builder.build());
        Self {
            name: name.into(),
            client,
            region,
            endpoint,
        }
    }

    fn object_key(path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        Ok(validated
            .to_str()
            .ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?
            .to_string())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, key),
        }
    }
}

#[async_trait]
impl FileStore for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, bucket: &str, path: &Path, data: &[u8]) -> Result<String> {
        let bucket = validate_bucket(bucket)?;
        let key = Self::object_key(path)?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("put s3://{}/{}", bucket, key)))?;
        tracing::debug!(backend = %self.name, bucket, key = %key, "bundle saved");
        Ok(self.object_url(bucket, &key))
    }

    async fn read(&self, bucket: &str, path: &Path) -> Result<Vec<u8>> {
        let bucket = validate_bucket(bucket)?;
        let key = Self::object_key(path)?;
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .or_raise(|| ErrorKind::NotFound(path.to_path_buf()))?;
        let bytes = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network(format!("get s3://{}/{}", bucket, key)))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn exists(&self, bucket: &str, path: &Path) -> Result<bool> {
        let bucket = validate_bucket(bucket)?;
        let key = Self::object_key(path)?;
        match self.client.head_object().bucket(bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(service) if service.is_not_found() => Ok(false),
                _ => Err(err).or_raise(|| ErrorKind::Network(format!("head s3://{}/{}", bucket, key))),
            },
        }
    }

    async fn delete(&self, bucket: &str, path: &Path) -> Result<()> {
        let bucket = validate_bucket(bucket)?;
        let key = Self::object_key(path)?;
        if !self.exists(bucket, path).await? {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        self.client
            .delete_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("delete s3://{}/{}", bucket, key)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_urls() {
        let aws = S3Backend::new("aws", "us-east-1", None, "id", "secret");
        assert_eq!(
            aws.object_url("drydock-docs", "addon/release-1.0.0/docs.json"),
            "https://drydock-docs.s3.us-east-1.amazonaws.com/addon/release-1.0.0/docs.json"
        );
        let b2 = S3Backend::new(
            "b2",
            "us-west-004",
            Some("https://s3.us-west-004.backblazeb2.com/".to_string()),
            "id",
            "secret",
        );
        assert_eq!(
            b2.object_url("drydock-docs", "addon/branch-master/docs.json"),
            "https://s3.us-west-004.backblazeb2.com/drydock-docs/addon/branch-master/docs.json"
        );
    }

    #[test]
    fn test_object_key_validation() {
        assert_eq!(S3Backend::object_key(Path::new("a/b/docs.json")).unwrap(), "a/b/docs.json");
        assert!(S3Backend::object_key(Path::new("../escape")).is_err());
    }
}
