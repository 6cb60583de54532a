/*!
 * Operator-facing refresh of registered file storages
 */

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ConfigOverride;
use crate::error::Result;
use crate::storage::{FileStorage, FileStorageLocator, MinioFileStorage};

/// Reported after a successful refresh
pub const REFRESHED: &str = "Refreshed successfully";

/// Reported when the target storage is not a [`MinioFileStorage`]
pub const NOT_MINIO: &str = "Not a MinIO file storage - refresh attempt ignored";

/// Management operations over the storages of a [`FileStorageLocator`]
#[derive(Debug, Clone)]
pub struct StorageManagement {
    locator: Arc<FileStorageLocator>,
}

impl StorageManagement {
    pub fn new(locator: Arc<FileStorageLocator>) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &Arc<FileStorageLocator> {
        &self.locator
    }

    /// Refresh the default storage with its current configuration
    pub fn refresh_default(&self) -> Result<&'static str> {
        let storage = self.locator.get_default()?;
        match as_minio(storage.as_ref()) {
            Some(minio) => {
                minio.refresh()?;
                info!(storage = storage.storage_name(), "refreshed default file storage");
                Ok(REFRESHED)
            }
            None => Ok(ignored(storage.as_ref())),
        }
    }

    /// Merge `overrides` onto a storage's configuration and refresh it
    ///
    /// An empty override refreshes with the current configuration.
    pub fn refresh(&self, storage_name: &str, overrides: &ConfigOverride) -> Result<&'static str> {
        let storage = self.locator.get_by_name(storage_name)?;
        match as_minio(storage.as_ref()) {
            Some(minio) => {
                minio.refresh_with(overrides)?;
                info!(storage = storage_name, "refreshed file storage");
                Ok(REFRESHED)
            }
            None => Ok(ignored(storage.as_ref())),
        }
    }

    /// Refresh a storage with a new key pair
    ///
    /// Keys left `None` are cleared; without both keys the storage takes its
    /// credentials from the environment.
    pub fn refresh_credentials(
        &self,
        storage_name: &str,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<&'static str> {
        let overrides = ConfigOverride {
            access_key: access_key.map(str::to_string),
            secret_key: secret_key.map(str::to_string),
            environment_credentials: true,
            ..Default::default()
        };
        self.refresh(storage_name, &overrides)
    }
}

fn as_minio(storage: &dyn FileStorage) -> Option<&MinioFileStorage> {
    storage.as_any().downcast_ref::<MinioFileStorage>()
}

fn ignored(storage: &dyn FileStorage) -> &'static str {
    warn!(storage = storage.storage_name(), "{}", NOT_MINIO);
    NOT_MINIO
}
