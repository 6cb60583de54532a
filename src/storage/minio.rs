//! File storage on MinIO or any S3-compatible object store
//!
//! Configuration is staged in a pending [`MinioConfig`] and only takes effect
//! on [`MinioFileStorage::refresh`], which validates it, builds a client and
//! publishes both as one snapshot. Every operation loads the snapshot once,
//! so a refresh never splits an operation across two configurations.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::key::{create_file_key, SystemTimeSource, TimeSource};
use super::{FileRef, FileStorage, ReadStream, UploadStream};
use crate::config::{ConfigOverride, MinioConfig};
use crate::error::{FileStorageError, Result};
use crate::protocol::s3::{upload_stream, ClientFactory, ClientSettings, ObjectClient};

/// Name a MinIO storage is registered under unless told otherwise
pub const DEFAULT_STORAGE_NAME: &str = "minio";

/// Client together with the settings it was built from
struct ClientSnapshot {
    client: Arc<dyn ObjectClient>,
    settings: ClientSettings,
}

/// [`FileStorage`] backed by an S3-compatible object store
pub struct MinioFileStorage {
    storage_name: String,
    config: Mutex<MinioConfig>,
    factory: Arc<dyn ClientFactory>,
    time_source: Arc<dyn TimeSource>,
    snapshot: ArcSwapOption<ClientSnapshot>,
}

impl MinioFileStorage {
    /// Storage talking to a real server through the AWS SDK
    ///
    /// Nothing is connected until [`refresh`](Self::refresh) or
    /// [`init`](Self::init) is called.
    #[cfg(feature = "s3-native")]
    pub fn new(storage_name: impl Into<String>, config: MinioConfig) -> Self {
        Self::with_factory(
            storage_name,
            config,
            Arc::new(crate::protocol::s3::SdkClientFactory),
        )
    }

    /// Storage named [`DEFAULT_STORAGE_NAME`] over the given settings
    #[cfg(feature = "s3-native")]
    pub fn from_config(config: MinioConfig) -> Self {
        Self::new(DEFAULT_STORAGE_NAME, config)
    }

    /// Storage named [`DEFAULT_STORAGE_NAME`] configured from `MINIOFS_*` variables
    #[cfg(feature = "s3-native")]
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(MinioConfig::from_env()?))
    }

    pub fn with_factory(
        storage_name: impl Into<String>,
        config: MinioConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            storage_name: storage_name.into(),
            config: Mutex::new(config),
            factory,
            time_source: Arc::new(SystemTimeSource),
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// Replace the clock used for the date part of new keys
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Startup refresh; the outcome is logged as well as returned
    pub fn init(&self) -> Result<()> {
        match self.refresh() {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(storage = %self.storage_name, error = %e, "file storage failed to initialize");
                Err(e)
            }
        }
    }

    /// Rebuild the client from the pending configuration
    ///
    /// On failure the previously installed client stays active.
    pub fn refresh(&self) -> Result<()> {
        let config = self.config.lock();
        self.install(&config)
    }

    /// Merge `overrides` onto the pending configuration and refresh
    ///
    /// The merged configuration is kept only if the refresh succeeds.
    pub fn refresh_with(&self, overrides: &ConfigOverride) -> Result<()> {
        let mut config = self.config.lock();
        let mut candidate = config.clone();
        candidate.apply(overrides);

        self.install(&candidate)?;
        *config = candidate;
        Ok(())
    }

    fn install(&self, config: &MinioConfig) -> Result<()> {
        config.validate()?;

        let settings = ClientSettings::from_config(config);
        if !settings.credentials.is_static() {
            warn!(
                storage = %self.storage_name,
                "no access key pair configured, using credentials from the environment"
            );
        }

        let client = self.factory.build(&settings).map_err(|e| {
            error!(storage = %self.storage_name, error = %e, "failed to build object store client");
            FileStorageError::config(format!(
                "Cannot create client for {}: {}",
                settings.endpoint_url, e
            ))
        })?;

        info!(
            storage = %self.storage_name,
            endpoint = %settings.endpoint_url,
            bucket = %settings.bucket,
            region = settings.region_or_default(),
            part_size = settings.part_size,
            "file storage refreshed"
        );

        self.snapshot
            .store(Some(Arc::new(ClientSnapshot { client, settings })));
        Ok(())
    }

    /// True once a refresh has installed a client
    pub fn is_initialized(&self) -> bool {
        self.snapshot.load().is_some()
    }

    /// Settings of the installed client
    pub fn active_settings(&self) -> Option<ClientSettings> {
        self.snapshot
            .load_full()
            .map(|snapshot| snapshot.settings.clone())
    }

    /// Pending configuration, applied on the next refresh
    pub fn config(&self) -> MinioConfig {
        self.config.lock().clone()
    }

    pub fn set_config(&self, config: MinioConfig) {
        *self.config.lock() = config;
    }

    pub fn apply_override(&self, overrides: &ConfigOverride) {
        self.config.lock().apply(overrides);
    }

    pub fn set_access_key(&self, access_key: Option<String>) {
        self.config.lock().access_key = access_key;
    }

    pub fn set_secret_key(&self, secret_key: Option<String>) {
        self.config.lock().secret_key = secret_key;
    }

    pub fn set_region(&self, region: Option<String>) {
        self.config.lock().region = region;
    }

    pub fn set_bucket(&self, bucket: impl Into<String>) {
        self.config.lock().bucket = bucket.into();
    }

    pub fn set_part_size(&self, part_size: u64) {
        self.config.lock().part_size = part_size;
    }

    pub fn set_endpoint_url(&self, endpoint_url: impl Into<String>) {
        self.config.lock().endpoint_url = endpoint_url.into();
    }

    fn current(
        &self,
        file_name: &str,
        failure: fn(&str) -> FileStorageError,
    ) -> Result<Arc<ClientSnapshot>> {
        self.snapshot.load_full().ok_or_else(|| {
            error!(
                storage = %self.storage_name,
                file_name,
                "file storage is not initialized, refresh it first"
            );
            failure(file_name)
        })
    }
}

fn save_failed(file_name: &str) -> FileStorageError {
    FileStorageError::io(file_name, format!("Could not save file {}.", file_name))
}

fn load_failed(file_name: &str) -> FileStorageError {
    FileStorageError::io(file_name, format!("Could not load file {}.", file_name))
}

fn delete_failed(file_name: &str) -> FileStorageError {
    FileStorageError::io(file_name, format!("Could not delete file {}.", file_name))
}

fn check_failed(file_name: &str) -> FileStorageError {
    FileStorageError::io(file_name, format!("Could not check file {}", file_name))
}

#[async_trait]
impl FileStorage for MinioFileStorage {
    fn storage_name(&self) -> &str {
        &self.storage_name
    }

    async fn save(&self, file_name: &str, mut stream: UploadStream) -> Result<FileRef> {
        let snapshot = self.current(file_name, save_failed)?;
        let settings = &snapshot.settings;
        let key = create_file_key(self.time_source.now(), file_name);

        let size = upload_stream(
            snapshot.client.as_ref(),
            &settings.bucket,
            &key,
            &mut stream,
            settings.part_size,
        )
        .await
        .map_err(|e| {
            error!(bucket = %settings.bucket, key = %key, file_name, error = %e, "failed to save file");
            save_failed(file_name)
        })?;

        debug!(bucket = %settings.bucket, key = %key, file_name, size, "saved file");
        Ok(FileRef::new(&self.storage_name, key, file_name))
    }

    async fn open(&self, reference: &FileRef) -> Result<ReadStream> {
        let file_name = reference.file_name();
        let snapshot = self.current(file_name, load_failed)?;
        let bucket = &snapshot.settings.bucket;

        let stream = snapshot
            .client
            .get_object(bucket, reference.path())
            .await
            .map_err(|e| {
                error!(bucket = %bucket, key = reference.path(), file_name, error = %e, "failed to load file");
                load_failed(file_name)
            })?;

        debug!(bucket = %bucket, key = reference.path(), "opened file");
        Ok(stream)
    }

    async fn remove(&self, reference: &FileRef) -> Result<()> {
        let file_name = reference.file_name();
        let snapshot = self.current(file_name, delete_failed)?;
        let bucket = &snapshot.settings.bucket;

        snapshot
            .client
            .delete_object(bucket, reference.path())
            .await
            .map_err(|e| {
                error!(bucket = %bucket, key = reference.path(), file_name, error = %e, "failed to delete file");
                delete_failed(file_name)
            })?;

        debug!(bucket = %bucket, key = reference.path(), "removed file");
        Ok(())
    }

    async fn exists(&self, reference: &FileRef) -> Result<bool> {
        let file_name = reference.file_name();
        let snapshot = self.current(file_name, check_failed)?;
        let bucket = &snapshot.settings.bucket;

        match snapshot.client.stat_object(bucket, reference.path()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(bucket = %bucket, key = reference.path(), code = e.code(), "file not found");
                Ok(false)
            }
            Err(e) => {
                error!(bucket = %bucket, key = reference.path(), file_name, error = %e, "failed to check file");
                Err(check_failed(file_name))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for MinioFileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.config.lock();
        f.debug_struct("MinioFileStorage")
            .field("storage_name", &self.storage_name)
            .field("endpoint_url", &config.endpoint_url)
            .field("bucket", &config.bucket)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_PART_SIZE;
    use crate::error::ErrorKind;
    use crate::protocol::s3::{MemoryClientFactory, MemoryObjectStore};
    use crate::storage::{key::FixedTimeSource, read_to_end};
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};

    const ENDPOINT: &str = "http://localhost:9000";

    fn setup(bucket: &str) -> (Arc<MemoryObjectStore>, MinioFileStorage) {
        crate::logging::init_test_logging();
        let store = Arc::new(MemoryObjectStore::new());
        store.create_bucket(bucket);
        let storage = MinioFileStorage::with_factory(
            "minio",
            MinioConfig::new(ENDPOINT, bucket).with_credentials("minioadmin", "minioadmin"),
            Arc::new(MemoryClientFactory::new(Arc::clone(&store))),
        );
        (store, storage)
    }

    #[test]
    fn test_refresh_installs_client() {
        let (_store, storage) = setup("files");
        assert!(!storage.is_initialized());

        storage.refresh().unwrap();
        assert!(storage.is_initialized());

        let settings = storage.active_settings().unwrap();
        assert_eq!(settings.bucket, "files");
        assert_eq!(settings.part_size, MIN_PART_SIZE);
    }

    #[test]
    fn test_refresh_rejects_missing_endpoint_and_keeps_client() {
        let (_store, storage) = setup("files");
        storage.refresh().unwrap();

        storage.set_endpoint_url("");
        let err = storage.refresh().unwrap_err();
        assert_eq!(err, FileStorageError::config("endpointUrl must not be empty"));
        assert_eq!(storage.active_settings().unwrap().endpoint_url, ENDPOINT);
    }

    #[test]
    fn test_refresh_rejects_missing_bucket() {
        let (_store, storage) = setup("files");
        storage.set_bucket("");
        let err = storage.refresh().unwrap_err();
        assert_eq!(err, FileStorageError::config("bucket must not be empty"));
        assert!(!storage.is_initialized());
    }

    #[test]
    fn test_refresh_rejects_unparseable_endpoint() {
        let (_store, storage) = setup("files");
        storage.set_endpoint_url("not a url");
        assert_eq!(storage.refresh().unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_setters_wait_for_refresh() {
        let (store, storage) = setup("files");
        store.create_bucket("archive");
        storage.refresh().unwrap();

        storage.set_bucket("archive");
        storage.set_part_size(2 * MIN_PART_SIZE);
        assert_eq!(storage.active_settings().unwrap().bucket, "files");
        assert_eq!(storage.config().bucket, "archive");

        storage.refresh().unwrap();
        let settings = storage.active_settings().unwrap();
        assert_eq!(settings.bucket, "archive");
        assert_eq!(settings.part_size, 2 * MIN_PART_SIZE);
    }

    #[test]
    fn test_refresh_with_keeps_config_on_failure() {
        let (_store, storage) = setup("files");
        storage.refresh().unwrap();

        let err = storage
            .refresh_with(&ConfigOverride::new().part_size(1024))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(storage.config().part_size, MIN_PART_SIZE);

        storage
            .refresh_with(&ConfigOverride::credentials("user", "password"))
            .unwrap();
        assert_eq!(storage.config().access_key.as_deref(), Some("user"));
        assert_eq!(
            storage.active_settings().unwrap().credentials.access_key(),
            Some("user")
        );
    }

    #[tokio::test]
    async fn test_operations_before_refresh_fail() {
        let (_store, storage) = setup("files");
        let reference = FileRef::new("minio", "2024/01/01/x.txt", "x.txt");

        let err = storage
            .save_bytes("x.txt", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Could not save file x.txt.");

        assert_eq!(storage.open(&reference).await.err().unwrap().kind(), ErrorKind::Io);
        assert_eq!(storage.remove(&reference).await.unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(storage.exists(&reference).await.unwrap_err().kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_save_uses_date_key() {
        let (store, storage) = setup("files");
        let storage = storage.with_time_source(Arc::new(FixedTimeSource(
            Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap(),
        )));
        storage.refresh().unwrap();

        let reference = storage
            .save_bytes("report.pdf", Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();

        assert_eq!(reference.storage_name(), "minio");
        assert_eq!(reference.file_name(), "report.pdf");
        assert!(reference.path().starts_with("2024/03/07/"));
        assert!(reference.path().ends_with(".pdf"));
        assert_eq!(
            store.object("files", reference.path()).unwrap(),
            Bytes::from_static(b"%PDF-1.7")
        );
    }

    #[tokio::test]
    async fn test_save_open_remove() {
        let (_store, storage) = setup("files");
        storage.refresh().unwrap();

        let reference = storage
            .save_bytes("notes.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(storage.exists(&reference).await.unwrap());

        let data = read_to_end(storage.open(&reference).await.unwrap())
            .await
            .unwrap();
        assert_eq!(data, b"hello");

        storage.remove(&reference).await.unwrap();
        assert!(!storage.exists(&reference).await.unwrap());

        // Removing again is not an error
        storage.remove(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (_store, storage) = setup("files");
        storage.refresh().unwrap();

        let reference = FileRef::new("minio", "2024/01/01/missing.txt", "missing.txt");
        let err = storage.open(&reference).await.err().unwrap();
        assert_eq!(err.to_string(), "Could not load file missing.txt.");
    }

    #[tokio::test]
    async fn test_save_to_missing_bucket() {
        let (_store, storage) = setup("files");
        storage.set_bucket("missing");
        storage.refresh().unwrap();

        let err = storage
            .save_bytes("a.txt", Bytes::from_static(b"a"))
            .await
            .unwrap_err();
        assert_eq!(err, save_failed("a.txt"));
    }

    #[tokio::test]
    async fn test_exists_not_found_codes() {
        let (_store, storage) = setup("files");
        storage.refresh().unwrap();
        let reference = FileRef::new("minio", "2024/01/01/a.txt", "a.txt");
        assert!(!storage.exists(&reference).await.unwrap());

        storage.set_bucket("missing");
        storage.refresh().unwrap();
        assert!(!storage.exists(&reference).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_access_denied_is_error() {
        let (store, storage) = setup("files");
        storage.refresh().unwrap();
        store.deny_bucket("files");

        let reference = FileRef::new("minio", "2024/01/01/a.txt", "a.txt");
        let err = storage.exists(&reference).await.unwrap_err();
        assert_eq!(err.to_string(), "Could not check file a.txt");
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_operations() {
        let (store, storage) = setup("files");
        store.reject_access_key("minioadmin");
        storage.refresh().unwrap();

        let err = storage
            .save_bytes("a.txt", Bytes::from_static(b"a"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let (_store, storage) = setup("files");
        let rendered = format!("{:?}", storage);
        assert!(rendered.contains("files"));
        assert!(!rendered.contains("minioadmin"));
    }
}
