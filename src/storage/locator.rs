//! Lookup of file storages by name

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::FileStorage;
use crate::error::{FileStorageError, Result};

/// Registry of the file storages an application uses
///
/// The first registered storage is the default until [`set_default`] picks
/// another one.
///
/// [`set_default`]: FileStorageLocator::set_default
///
/// # Example
///
/// ```no_run
/// use miniofs::config::MinioConfig;
/// use miniofs::storage::{FileStorageLocator, LocalFileStorage, MinioFileStorage};
/// use std::sync::Arc;
///
/// let locator = FileStorageLocator::new();
/// locator.register(Arc::new(MinioFileStorage::new(
///     "minio",
///     MinioConfig::new("http://localhost:9000", "files"),
/// )));
/// locator.register(Arc::new(LocalFileStorage::new("fs", "/var/lib/app/files")));
///
/// assert_eq!(locator.get_default().unwrap().storage_name(), "minio");
/// ```
#[derive(Default)]
pub struct FileStorageLocator {
    storages: RwLock<HashMap<String, Arc<dyn FileStorage>>>,
    default_name: RwLock<Option<String>>,
}

impl FileStorageLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage under its own name, replacing any previous one
    pub fn register(&self, storage: Arc<dyn FileStorage>) {
        let name = storage.storage_name().to_string();
        self.storages.write().insert(name.clone(), storage);

        let mut default_name = self.default_name.write();
        if default_name.is_none() {
            *default_name = Some(name);
        }
    }

    /// Make a registered storage the default
    pub fn set_default(&self, name: &str) -> Result<()> {
        if !self.storages.read().contains_key(name) {
            return Err(unknown_storage(name));
        }
        *self.default_name.write() = Some(name.to_string());
        Ok(())
    }

    pub fn get_default(&self) -> Result<Arc<dyn FileStorage>> {
        let name = self
            .default_name
            .read()
            .clone()
            .ok_or_else(|| FileStorageError::config("No file storage registered"))?;
        self.get_by_name(&name)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Arc<dyn FileStorage>> {
        self.storages
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| unknown_storage(name))
    }

    /// Registered storage names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.storages.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn unknown_storage(name: &str) -> FileStorageError {
    FileStorageError::config(format!("No file storage named '{}'", name))
}

impl fmt::Debug for FileStorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorageLocator")
            .field("storages", &self.names())
            .field("default", &*self.default_name.read())
            .finish()
    }
}
