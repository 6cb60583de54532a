//! S3 client implementation on the AWS SDK

use async_trait::async_trait;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, SharedCredentialsProvider};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use futures::stream;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::credentials::{minio_environment_keys, CredentialsSource};
use super::error::{TransportError, TransportResult, NO_SUCH_KEY};
use super::types::{ObjectStat, ReadStream, UploadPartInfo};
use super::{ClientFactory, ClientSettings, ObjectClient};

/// Size of the chunks yielded by object read streams
const READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Object client for MinIO and Amazon S3
#[derive(Clone, Debug)]
pub struct SdkObjectClient {
    client: AwsS3Client,
    endpoint_url: String,
}

impl SdkObjectClient {
    /// Build a client bound to the settings' endpoint, region and credentials
    ///
    /// Path-style addressing is always on, which MinIO requires and Amazon S3
    /// accepts.
    pub fn new(settings: &ClientSettings) -> TransportResult<Self> {
        url::Url::parse(&settings.endpoint_url).map_err(|e| {
            TransportError::InvalidConfig(format!(
                "invalid endpoint URL '{}': {}",
                settings.endpoint_url, e
            ))
        })?;

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&settings.endpoint_url)
            .region(Region::new(settings.region_or_default().to_string()))
            .credentials_provider(credentials_provider(&settings.credentials))
            .force_path_style(true)
            .build();

        debug!(
            endpoint = %settings.endpoint_url,
            region = settings.region_or_default(),
            static_credentials = settings.credentials.is_static(),
            "built S3 client"
        );

        Ok(Self {
            client: AwsS3Client::from_conf(s3_config),
            endpoint_url: settings.endpoint_url.clone(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Get a reference to the underlying AWS S3 client
    pub fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }
}

fn credentials_provider(source: &CredentialsSource) -> SharedCredentialsProvider {
    match source {
        CredentialsSource::Static {
            access_key,
            secret_key,
        } => SharedCredentialsProvider::new(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "miniofs-static",
        )),
        CredentialsSource::Environment => {
            match minio_environment_keys(|name| std::env::var(name).ok()) {
                Some((access_key, secret_key)) => SharedCredentialsProvider::new(
                    Credentials::new(access_key, secret_key, None, None, "miniofs-environment"),
                ),
                None => SharedCredentialsProvider::new(EnvironmentVariableCredentialsProvider::new()),
            }
        }
    }
}

#[async_trait]
impl ObjectClient for SdkObjectClient {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> TransportResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> TransportResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(TransportError::from)?;

        response
            .upload_id()
            .ok_or_else(|| TransportError::MultipartUpload("No upload ID returned".to_string()))
            .map(|s| s.to_string())
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> TransportResult<UploadPartInfo> {
        let size = data.len();

        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(TransportError::from)?;

        let etag = response
            .e_tag()
            .ok_or_else(|| {
                TransportError::MultipartUpload(format!(
                    "No ETag returned for part {}",
                    part_number
                ))
            })?
            .to_string();

        Ok(UploadPartInfo::new(part_number, etag, size))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadPartInfo],
    ) -> TransportResult<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(TransportError::from)?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> TransportResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(TransportError::from)?;

        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> TransportResult<ReadStream> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(TransportError::from)?;

        let reader = output.body.into_async_read();

        let stream = stream::unfold(
            (reader, vec![0u8; READ_CHUNK_SIZE]),
            |(mut reader, mut buffer)| async move {
                match reader.read(&mut buffer).await {
                    Ok(0) => None,
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buffer[..n]);
                        Some((Ok(data), (reader, buffer)))
                    }
                    Err(e) => Some((Err(e), (reader, buffer))),
                }
            },
        );

        Ok(Box::pin(stream))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> TransportResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> TransportResult<ObjectStat> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                // HEAD responses carry no error body, so a 404 arrives without
                // the store's code.
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    TransportError::service(NO_SUCH_KEY, format!("{}/{} not found", bucket, key))
                } else {
                    TransportError::from(e)
                }
            })?;

        Ok(ObjectStat {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            etag: response.e_tag().map(|s| s.to_string()),
            last_modified: response
                .last_modified()
                .and_then(|dt| SystemTime::try_from(*dt).ok()),
        })
    }
}

/// Builds [`SdkObjectClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkClientFactory;

impl ClientFactory for SdkClientFactory {
    fn build(&self, settings: &ClientSettings) -> TransportResult<Arc<dyn ObjectClient>> {
        Ok(Arc::new(SdkObjectClient::new(settings)?))
    }
}
