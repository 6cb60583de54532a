//! S3-compatible object-store transport
//!
//! The file storages never talk to an SDK directly. They hold an
//! [`ObjectClient`] built by a [`ClientFactory`] from [`ClientSettings`]:
//!
//! - [`SdkClientFactory`] builds clients on `aws-sdk-s3`, for MinIO and Amazon S3
//! - [`MemoryClientFactory`] builds clients over an in-process [`MemoryObjectStore`]
//!
//! # Example
//!
//! ```ignore
//! use miniofs::config::MinioConfig;
//! use miniofs::protocol::s3::{ClientFactory, ClientSettings, SdkClientFactory};
//!
//! let config = MinioConfig::new("http://localhost:9000", "files")
//!     .with_credentials("minioadmin", "minioadmin");
//! let settings = ClientSettings::from_config(&config);
//! let client = SdkClientFactory.build(&settings)?;
//! ```

#[cfg(feature = "s3-native")]
mod client;
mod credentials;
mod error;
mod memory;
mod multipart;
mod types;

#[cfg(feature = "s3-native")]
pub use client::{SdkClientFactory, SdkObjectClient};
pub use credentials::{minio_environment_keys, CredentialsSource};
pub use error::{
    TransportError, TransportResult, ACCESS_DENIED, NOT_FOUND_CODES, NO_SUCH_BUCKET, NO_SUCH_KEY,
};
pub use memory::{MemoryClientFactory, MemoryObjectClient, MemoryObjectStore};
pub use multipart::upload_stream;
pub use types::{ObjectStat, ReadStream, UploadPartInfo};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::MinioConfig;

/// Region used when none is configured (MinIO's default)
pub const DEFAULT_REGION: &str = "us-east-1";

/// Everything a client is built from, resolved at refresh time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint_url: String,
    pub region: Option<String>,
    pub bucket: String,
    pub part_size: u64,
    pub credentials: CredentialsSource,
}

impl ClientSettings {
    pub fn from_config(config: &MinioConfig) -> Self {
        Self {
            endpoint_url: config.endpoint_url.clone(),
            region: config.region.clone(),
            bucket: config.bucket.clone(),
            part_size: config.part_size,
            credentials: CredentialsSource::from_config(config),
        }
    }

    /// Configured region, or [`DEFAULT_REGION`]
    pub fn region_or_default(&self) -> &str {
        self.region
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION)
    }
}

/// Calls an S3-compatible store must answer
///
/// Bucket and key are passed on every call; clients carry connection state
/// only and are shared read-only between concurrent operations.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Store a complete object in one request
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> TransportResult<()>;

    /// Start a multipart upload and return its upload ID
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> TransportResult<String>;

    /// Upload one part of a multipart upload
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> TransportResult<UploadPartInfo>;

    /// Assemble the uploaded parts into the final object
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadPartInfo],
    ) -> TransportResult<()>;

    /// Discard a multipart upload and its parts
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> TransportResult<()>;

    /// Fetch an object as a byte stream
    async fn get_object(&self, bucket: &str, key: &str) -> TransportResult<ReadStream>;

    /// Delete an object; a missing key is not an error
    async fn delete_object(&self, bucket: &str, key: &str) -> TransportResult<()>;

    /// Fetch object metadata
    ///
    /// A missing object must surface as a [`TransportError::Service`] with
    /// code [`NO_SUCH_KEY`] or [`NO_SUCH_BUCKET`].
    async fn stat_object(&self, bucket: &str, key: &str) -> TransportResult<ObjectStat>;
}

/// Builds clients from resolved settings
pub trait ClientFactory: Send + Sync {
    fn build(&self, settings: &ClientSettings) -> TransportResult<Arc<dyn ObjectClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = MinioConfig::new("http://localhost:9000", "files")
            .with_credentials("minioadmin", "minioadmin")
            .with_part_size(8 * 1024 * 1024);

        let settings = ClientSettings::from_config(&config);
        assert_eq!(settings.endpoint_url, "http://localhost:9000");
        assert_eq!(settings.bucket, "files");
        assert_eq!(settings.part_size, 8 * 1024 * 1024);
        assert!(settings.credentials.is_static());
    }

    #[test]
    fn test_region_defaults() {
        let mut settings =
            ClientSettings::from_config(&MinioConfig::new("http://localhost:9000", "files"));
        assert_eq!(settings.region_or_default(), DEFAULT_REGION);

        settings.region = Some(String::new());
        assert_eq!(settings.region_or_default(), DEFAULT_REGION);

        settings.region = Some("eu-central-1".to_string());
        assert_eq!(settings.region_or_default(), "eu-central-1");
    }
}
