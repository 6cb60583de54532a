//! File storage on the local filesystem

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::any::Any;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, warn};

use super::key::{create_file_key, SystemTimeSource, TimeSource};
use super::{FileRef, FileStorage, ReadStream, UploadStream};
use crate::error::{FileStorageError, Result};

/// Name a local storage is registered under unless told otherwise
pub const DEFAULT_LOCAL_STORAGE_NAME: &str = "fs";

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// [`FileStorage`] keeping files below a root directory
///
/// Files are laid out with the same `YYYY/MM/DD/<uuid>.<ext>` keys as the
/// object store storages.
pub struct LocalFileStorage {
    storage_name: String,
    root: PathBuf,
    time_source: Arc<dyn TimeSource>,
}

impl LocalFileStorage {
    pub fn new(storage_name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            storage_name: storage_name.into(),
            root: root.into(),
            time_source: Arc::new(SystemTimeSource),
        }
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a key, refusing anything that would leave the root
    fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if !contained {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("key '{}' escapes the storage root", key),
            ));
        }

        Ok(self.root.join(relative))
    }

    async fn write(&self, key: &str, stream: &mut UploadStream) -> io::Result<u64> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        let written = match tokio::io::copy(stream, &mut file).await {
            Ok(size) => file.flush().await.map(|()| size),
            Err(e) => Err(e),
        };
        drop(file);

        if written.is_err() {
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove partial file");
            }
        }
        written
    }
}

fn read_stream(file: fs::File) -> ReadStream {
    let chunks = stream::unfold(
        (file, vec![0u8; READ_CHUNK_SIZE]),
        |(mut file, mut buffer)| async move {
            match file.read(&mut buffer).await {
                Ok(0) => None,
                Ok(n) => Some((Ok(Bytes::copy_from_slice(&buffer[..n])), (file, buffer))),
                Err(e) => Some((Err(e), (file, buffer))),
            }
        },
    );
    Box::pin(chunks)
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    fn storage_name(&self) -> &str {
        &self.storage_name
    }

    async fn save(&self, file_name: &str, mut stream: UploadStream) -> Result<FileRef> {
        let key = create_file_key(self.time_source.now(), file_name);

        let size = self.write(&key, &mut stream).await.map_err(|e| {
            error!(root = %self.root.display(), key = %key, file_name, error = %e, "failed to save file");
            FileStorageError::io(file_name, format!("Could not save file {}.", file_name))
        })?;

        debug!(key = %key, file_name, size, "saved file");
        Ok(FileRef::new(&self.storage_name, key, file_name))
    }

    async fn open(&self, reference: &FileRef) -> Result<ReadStream> {
        let file_name = reference.file_name();
        let opened = match self.resolve(reference.path()) {
            Ok(path) => fs::File::open(path).await,
            Err(e) => Err(e),
        };

        let file = opened.map_err(|e| {
            error!(key = reference.path(), file_name, error = %e, "failed to load file");
            FileStorageError::io(file_name, format!("Could not load file {}.", file_name))
        })?;

        Ok(read_stream(file))
    }

    async fn remove(&self, reference: &FileRef) -> Result<()> {
        let file_name = reference.file_name();
        let removed = match self.resolve(reference.path()) {
            Ok(path) => fs::remove_file(path).await,
            Err(e) => Err(e),
        };

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!(key = reference.path(), file_name, error = %e, "failed to delete file");
                Err(FileStorageError::io(
                    file_name,
                    format!("Could not delete file {}.", file_name),
                ))
            }
        }
    }

    async fn exists(&self, reference: &FileRef) -> Result<bool> {
        let file_name = reference.file_name();
        let checked = match self.resolve(reference.path()) {
            Ok(path) => fs::try_exists(path).await,
            Err(e) => Err(e),
        };

        checked.map_err(|e| {
            error!(key = reference.path(), file_name, error = %e, "failed to check file");
            FileStorageError::io(file_name, format!("Could not check file {}", file_name))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for LocalFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStorage")
            .field("storage_name", &self.storage_name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::{key::FixedTimeSource, read_to_end};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn storage() -> (TempDir, LocalFileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(DEFAULT_LOCAL_STORAGE_NAME, dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_save_open_remove() {
        let (dir, storage) = storage();
        let storage = storage.with_time_source(Arc::new(FixedTimeSource(
            Utc.with_ymd_and_hms(2024, 3, 7, 8, 0, 0).unwrap(),
        )));

        let reference = storage
            .save_bytes("notes.txt", Bytes::from_static(b"local data"))
            .await
            .unwrap();
        assert_eq!(reference.storage_name(), "fs");
        assert!(reference.path().starts_with("2024/03/07/"));
        assert!(dir.path().join(reference.path()).is_file());
        assert!(storage.exists(&reference).await.unwrap());

        let data = read_to_end(storage.open(&reference).await.unwrap())
            .await
            .unwrap();
        assert_eq!(data, b"local data");

        storage.remove(&reference).await.unwrap();
        assert!(!storage.exists(&reference).await.unwrap());
        storage.remove(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (_dir, storage) = storage();
        let reference = FileRef::new("fs", "2024/01/01/missing.txt", "missing.txt");
        let err = storage.open(&reference).await.err().unwrap();
        assert_eq!(err.to_string(), "Could not load file missing.txt.");
    }

    /// Yields `good` bytes, then fails
    struct FailingReader {
        good: usize,
    }

    impl tokio::io::AsyncRead for FailingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            if self.good == 0 {
                return std::task::Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "peer went away",
                )));
            }
            let n = self.good.min(buf.remaining());
            buf.put_slice(&vec![0x5a; n]);
            self.good -= n;
            std::task::Poll::Ready(Ok(()))
        }
    }

    fn count_files(dir: &Path) -> usize {
        let mut count = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                count += count_files(&path);
            } else {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_partial_file() {
        let (dir, storage) = storage();

        let err = storage
            .save("a.txt", Box::new(FailingReader { good: 1000 }))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Could not save file a.txt.");
        assert_eq!(count_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let (_dir, storage) = storage();
        for key in ["../outside.txt", "/etc/passwd", "2024/../../x"] {
            let reference = FileRef::new("fs", key, "x.txt");
            assert_eq!(
                storage.exists(&reference).await.unwrap_err().kind(),
                ErrorKind::Io
            );
            assert!(storage.remove(&reference).await.is_err());
        }
    }
}
