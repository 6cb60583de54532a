//! In-process S3-compatible object store
//!
//! Answers with the same error codes a MinIO server would, so storages can be
//! exercised without a running server.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use super::error::{TransportError, TransportResult, ACCESS_DENIED, NO_SUCH_BUCKET, NO_SUCH_KEY};
use super::types::{ObjectStat, ReadStream, UploadPartInfo};
use super::{ClientFactory, ClientSettings, ObjectClient};
use crate::config::MIN_PART_SIZE;

/// Chunk size of the streams returned by `get_object`
const READ_CHUNK: usize = 64 * 1024;

/// Counters of completed store operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub single_puts: usize,
    pub parts_uploaded: usize,
    pub multipart_completed: usize,
    pub multipart_aborted: usize,
    pub deletes: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: SystemTime,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct StoreState {
    buckets: HashMap<String, HashMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
    denied_buckets: HashSet<String>,
    rejected_keys: HashSet<String>,
    stats: StoreStats,
}

/// Buckets of objects held in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().buckets.contains_key(bucket)
    }

    /// Answer every request against `bucket` with `AccessDenied`
    pub fn deny_bucket(&self, bucket: &str) {
        self.state.lock().denied_buckets.insert(bucket.to_string());
    }

    /// Answer every request signed with `access_key` with `AccessDenied`
    pub fn reject_access_key(&self, access_key: &str) {
        self.state.lock().rejected_keys.insert(access_key.to_string());
    }

    /// Stored bytes of an object
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Keys stored in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut keys: Vec<String> = state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats
    }

    /// Number of multipart uploads started but neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    /// Client bound to this store with environment credentials
    pub fn client(self: &Arc<Self>) -> MemoryObjectClient {
        MemoryObjectClient {
            store: Arc::clone(self),
            access_key: None,
        }
    }
}

impl StoreState {
    fn check_access(&self, access_key: Option<&str>, bucket: &str) -> TransportResult<()> {
        let rejected = access_key.is_some_and(|key| self.rejected_keys.contains(key));
        if rejected || self.denied_buckets.contains(bucket) {
            return Err(TransportError::service(ACCESS_DENIED, "Access Denied."));
        }
        Ok(())
    }

    fn bucket_mut(&mut self, bucket: &str) -> TransportResult<&mut HashMap<String, StoredObject>> {
        self.buckets.get_mut(bucket).ok_or_else(no_such_bucket)
    }

    fn bucket(&self, bucket: &str) -> TransportResult<&HashMap<String, StoredObject>> {
        self.buckets.get(bucket).ok_or_else(no_such_bucket)
    }
}

fn no_such_bucket() -> TransportError {
    TransportError::service(NO_SUCH_BUCKET, "The specified bucket does not exist")
}

fn no_such_key() -> TransportError {
    TransportError::service(NO_SUCH_KEY, "The specified key does not exist.")
}

fn new_etag() -> String {
    format!("\"{}\"", uuid::Uuid::new_v4().simple())
}

/// Client handle onto a [`MemoryObjectStore`]
#[derive(Debug, Clone)]
pub struct MemoryObjectClient {
    store: Arc<MemoryObjectStore>,
    access_key: Option<String>,
}

impl MemoryObjectClient {
    pub fn store(&self) -> &Arc<MemoryObjectStore> {
        &self.store
    }

    fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> TransportResult<()> {
        let mut state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;
        state.bucket_mut(bucket)?.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: new_etag(),
                last_modified: SystemTime::now(),
            },
        );
        state.stats.single_puts += 1;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> TransportResult<String> {
        let mut state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;
        state.bucket(bucket)?;

        let upload_id = uuid::Uuid::new_v4().to_string();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> TransportResult<UploadPartInfo> {
        let mut state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;

        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| {
                TransportError::service("NoSuchUpload", "The specified upload does not exist.")
            })?;

        let etag = new_etag();
        let size = data.len();
        upload.parts.insert(part_number, (etag.clone(), data));
        state.stats.parts_uploaded += 1;

        Ok(UploadPartInfo::new(part_number, etag, size))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadPartInfo],
    ) -> TransportResult<()> {
        let mut state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;

        let upload = match state.uploads.remove(upload_id) {
            Some(upload) if upload.bucket == bucket && upload.key == key => upload,
            Some(upload) => {
                state.uploads.insert(upload_id.to_string(), upload);
                return Err(TransportError::service(
                    "NoSuchUpload",
                    "The specified upload does not exist.",
                ));
            }
            None => {
                return Err(TransportError::service(
                    "NoSuchUpload",
                    "The specified upload does not exist.",
                ))
            }
        };

        if parts.is_empty() {
            return Err(TransportError::service(
                "MalformedXML",
                "You must specify at least one part.",
            ));
        }

        let mut assembled = Vec::new();
        let mut previous = 0;
        for (index, part) in parts.iter().enumerate() {
            if part.part_number <= previous {
                return Err(TransportError::service(
                    "InvalidPartOrder",
                    "The list of parts was not in ascending order.",
                ));
            }
            previous = part.part_number;

            let (etag, data) = upload.parts.get(&part.part_number).ok_or_else(|| {
                TransportError::service("InvalidPart", "One or more of the specified parts could not be found.")
            })?;
            if *etag != part.etag {
                return Err(TransportError::service(
                    "InvalidPart",
                    "One or more of the specified parts could not be found.",
                ));
            }
            if index + 1 < parts.len() && (data.len() as u64) < MIN_PART_SIZE {
                return Err(TransportError::service(
                    "EntityTooSmall",
                    "Your proposed upload is smaller than the minimum allowed object size.",
                ));
            }
            assembled.extend_from_slice(data);
        }

        state.bucket_mut(bucket)?.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(assembled),
                etag: new_etag(),
                last_modified: SystemTime::now(),
            },
        );
        state.stats.multipart_completed += 1;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> TransportResult<()> {
        let mut state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;

        if state.uploads.remove(upload_id).is_none() {
            return Err(TransportError::service(
                "NoSuchUpload",
                "The specified upload does not exist.",
            ));
        }
        state.stats.multipart_aborted += 1;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> TransportResult<ReadStream> {
        let data = {
            let state = self.store.state.lock();
            state.check_access(self.access_key(), bucket)?;
            state
                .bucket(bucket)?
                .get(key)
                .map(|object| object.data.clone())
                .ok_or_else(no_such_key)?
        };

        let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK).min(data.len()))))
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> TransportResult<()> {
        let mut state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;
        state.bucket_mut(bucket)?.remove(key);
        state.stats.deletes += 1;
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> TransportResult<ObjectStat> {
        let state = self.store.state.lock();
        state.check_access(self.access_key(), bucket)?;
        let object = state.bucket(bucket)?.get(key).ok_or_else(no_such_key)?;

        Ok(ObjectStat {
            key: key.to_string(),
            size: object.data.len() as u64,
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
        })
    }
}

/// Builds [`MemoryObjectClient`]s over one shared store
#[derive(Debug, Clone)]
pub struct MemoryClientFactory {
    store: Arc<MemoryObjectStore>,
}

impl MemoryClientFactory {
    pub fn new(store: Arc<MemoryObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryObjectStore> {
        &self.store
    }
}

impl ClientFactory for MemoryClientFactory {
    fn build(&self, settings: &ClientSettings) -> TransportResult<Arc<dyn ObjectClient>> {
        url::Url::parse(&settings.endpoint_url).map_err(|e| {
            TransportError::InvalidConfig(format!(
                "invalid endpoint URL '{}': {}",
                settings.endpoint_url, e
            ))
        })?;

        Ok(Arc::new(MemoryObjectClient {
            store: Arc::clone(&self.store),
            access_key: settings.credentials.access_key().map(str::to_string),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinioConfig;
    use futures::TryStreamExt;

    fn store() -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new());
        store.create_bucket("files");
        store
    }

    async fn read_all(stream: ReadStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = store();
        let client = store.client();

        client
            .put_object("files", "a/b.txt", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let data = read_all(client.get_object("files", "a/b.txt").await.unwrap()).await;
        assert_eq!(data, b"payload");
        assert_eq!(store.keys("files"), vec!["a/b.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_get_streams_in_chunks() {
        let store = store();
        let client = store.client();
        let payload = vec![1u8; READ_CHUNK * 2 + 10];

        client
            .put_object("files", "big", Bytes::from(payload.clone()))
            .await
            .unwrap();

        let chunks: Vec<Bytes> = client
            .get_object("files", "big")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), payload);
    }

    #[tokio::test]
    async fn test_missing_bucket_and_key_codes() {
        let store = store();
        let client = store.client();

        let err = client.stat_object("nope", "k").await.unwrap_err();
        assert_eq!(err.code(), Some(NO_SUCH_BUCKET));

        let err = client.stat_object("files", "k").await.unwrap_err();
        assert_eq!(err.code(), Some(NO_SUCH_KEY));

        let err = client.get_object("files", "k").await.err().unwrap();
        assert_eq!(err.code(), Some(NO_SUCH_KEY));
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let store = store();
        let client = store.client();

        client.delete_object("files", "never-stored").await.unwrap();
        assert_eq!(store.stats().deletes, 1);

        let err = client.delete_object("nope", "k").await.unwrap_err();
        assert_eq!(err.code(), Some(NO_SUCH_BUCKET));
    }

    #[tokio::test]
    async fn test_denied_bucket() {
        let store = store();
        store.deny_bucket("files");
        let client = store.client();

        let err = client.stat_object("files", "k").await.unwrap_err();
        assert_eq!(err.code(), Some(ACCESS_DENIED));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejected_access_key() {
        let store = store();
        store.reject_access_key("revoked");
        let factory = MemoryClientFactory::new(Arc::clone(&store));

        let config = MinioConfig::new("http://localhost:9000", "files")
            .with_credentials("revoked", "secret");
        let client = factory
            .build(&ClientSettings::from_config(&config))
            .unwrap();

        let err = client
            .put_object("files", "k", Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ACCESS_DENIED));

        let config = config.with_credentials("fresh", "secret");
        let client = factory
            .build(&ClientSettings::from_config(&config))
            .unwrap();
        client.put_object("files", "k", Bytes::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_rejects_small_middle_part() {
        let store = store();
        let client = store.client();

        let upload_id = client.create_multipart_upload("files", "k").await.unwrap();
        let p1 = client
            .upload_part("files", "k", &upload_id, 1, Bytes::from_static(b"tiny"))
            .await
            .unwrap();
        let p2 = client
            .upload_part("files", "k", &upload_id, 2, Bytes::from_static(b"tail"))
            .await
            .unwrap();

        let err = client
            .complete_multipart_upload("files", "k", &upload_id, &[p1, p2])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("EntityTooSmall"));
    }

    #[tokio::test]
    async fn test_abort_discards_upload() {
        let store = store();
        let client = store.client();

        let upload_id = client.create_multipart_upload("files", "k").await.unwrap();
        assert_eq!(store.pending_uploads(), 1);

        client
            .abort_multipart_upload("files", "k", &upload_id)
            .await
            .unwrap();
        assert_eq!(store.pending_uploads(), 0);
        assert_eq!(store.stats().multipart_aborted, 1);
    }

    #[test]
    fn test_factory_rejects_bad_endpoint() {
        let factory = MemoryClientFactory::new(store());
        let config = MinioConfig::new("not a url", "files");

        let result = factory.build(&ClientSettings::from_config(&config));
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
