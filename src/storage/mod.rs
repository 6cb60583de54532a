//! File storage abstraction
//!
//! Applications store and fetch files through [`FileStorage`]. A storage hands
//! out a [`FileRef`] on save; the reference is all that is needed to open,
//! remove or check the file later. Several storages can live side by side in
//! a [`FileStorageLocator`].
//!
//! # Example
//!
//! ```no_run
//! use miniofs::config::MinioConfig;
//! use miniofs::storage::{FileStorage, MinioFileStorage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MinioConfig::new("http://localhost:9000", "files")
//!         .with_credentials("minioadmin", "minioadmin");
//!     let storage = MinioFileStorage::new("minio", config);
//!     storage.refresh()?;
//!
//!     let reference = storage.save_bytes("report.pdf", "%PDF-1.7".into()).await?;
//!     assert!(storage.exists(&reference).await?);
//!     println!("stored as {}", reference);
//!     Ok(())
//! }
//! ```

pub mod key;
mod local;
mod locator;
mod minio;

pub use key::{FixedTimeSource, SystemTimeSource, TimeSource};
pub use local::{LocalFileStorage, DEFAULT_LOCAL_STORAGE_NAME};
pub use locator::FileStorageLocator;
pub use minio::{MinioFileStorage, DEFAULT_STORAGE_NAME};

pub use crate::protocol::s3::ReadStream;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use tokio::io::AsyncRead;

use crate::error::{FileStorageError, Result};

/// Byte stream a caller hands to [`FileStorage::save`]
pub type UploadStream = Box<dyn AsyncRead + Unpin + Send>;

/// Characters escaped in the key part of a reference URI
const KEY_ESCAPE: &AsciiSet = &CONTROLS.add(b' ').add(b'?').add(b'#').add(b'%').add(b'&');

/// Characters escaped in the `name` query parameter of a reference URI
const NAME_ESCAPE: &AsciiSet = &KEY_ESCAPE.add(b'/').add(b'=').add(b'+');

/// Characters escaped in the storage name of a reference URI
const STORAGE_ESCAPE: &AsciiSet = &KEY_ESCAPE.add(b'/').add(b':');

/// Reference to a stored file
///
/// Renders as `<storage>://<key>?name=<file name>`, which [`FromStr`] parses
/// back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    storage_name: String,
    path: String,
    file_name: String,
}

impl FileRef {
    pub fn new(
        storage_name: impl Into<String>,
        path: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            storage_name: storage_name.into(),
            path: path.into(),
            file_name: file_name.into(),
        }
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Object key inside the storage
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the file as the caller supplied it
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}?name={}",
            utf8_percent_encode(&self.storage_name, STORAGE_ESCAPE),
            utf8_percent_encode(&self.path, KEY_ESCAPE),
            utf8_percent_encode(&self.file_name, NAME_ESCAPE)
        )
    }
}

impl FromStr for FileRef {
    type Err = FileStorageError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            FileStorageError::config(format!("Invalid file reference '{}': {}", s, reason))
        };
        let decode = |part: &str| {
            percent_decode_str(part)
                .decode_utf8()
                .map(|decoded| decoded.into_owned())
                .map_err(|_| invalid("not valid UTF-8"))
        };

        let (storage_name, rest) = s.split_once("://").ok_or_else(|| invalid("missing '://'"))?;
        if storage_name.is_empty() {
            return Err(invalid("empty storage name"));
        }

        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        if path.is_empty() {
            return Err(invalid("empty path"));
        }

        let file_name = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("name="))
            .ok_or_else(|| invalid("missing 'name' parameter"))?;

        Ok(FileRef::new(
            decode(storage_name)?,
            decode(path)?,
            decode(file_name)?,
        ))
    }
}

/// Storage of whole files addressed by [`FileRef`]
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Name this storage is registered under
    fn storage_name(&self) -> &str;

    /// Store the stream under a freshly generated key
    async fn save(&self, file_name: &str, stream: UploadStream) -> Result<FileRef>;

    /// Open a stored file for reading
    ///
    /// The caller owns the stream and decides how far to read it.
    async fn open(&self, reference: &FileRef) -> Result<ReadStream>;

    /// Remove a stored file
    async fn remove(&self, reference: &FileRef) -> Result<()>;

    /// Check whether a stored file is present
    async fn exists(&self, reference: &FileRef) -> Result<bool>;

    /// Concrete storage, for callers that manage a specific implementation
    fn as_any(&self) -> &dyn Any;

    /// Store an in-memory buffer
    async fn save_bytes(&self, file_name: &str, data: Bytes) -> Result<FileRef> {
        self.save(file_name, Box::new(std::io::Cursor::new(data)))
            .await
    }
}

/// Drain a read stream into memory
pub async fn read_to_end(stream: ReadStream) -> std::io::Result<Vec<u8>> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    Ok(chunks.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ref_accessors() {
        let reference = FileRef::new("minio", "2024/03/07/abc.pdf", "report.pdf");
        assert_eq!(reference.storage_name(), "minio");
        assert_eq!(reference.path(), "2024/03/07/abc.pdf");
        assert_eq!(reference.file_name(), "report.pdf");
    }

    #[test]
    fn test_file_ref_uri_form() {
        let reference = FileRef::new("minio", "2024/03/07/abc.pdf", "Q1 report.pdf");
        assert_eq!(
            reference.to_string(),
            "minio://2024/03/07/abc.pdf?name=Q1%20report.pdf"
        );
    }

    #[test]
    fn test_file_ref_parses_its_uri() {
        let reference = FileRef::new("minio", "2024/03/07/a b?c.txt", "dir/na&me=x+y %.txt");
        let parsed: FileRef = reference.to_string().parse().unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn test_file_ref_storage_name_is_escaped() {
        let reference = FileRef::new("s3://eu?x", "2024/03/07/abc.pdf", "report.pdf");
        let rendered = reference.to_string();
        assert!(rendered.starts_with("s3%3A%2F%2Feu%3Fx://"));

        let parsed: FileRef = rendered.parse().unwrap();
        assert_eq!(parsed, reference);
        assert_eq!(parsed.storage_name(), "s3://eu?x");
    }

    #[test]
    fn test_file_ref_parse_unicode_name() {
        let reference = FileRef::new("fs", "2024/01/01/id.txt", "отчёт.txt");
        let parsed: FileRef = reference.to_string().parse().unwrap();
        assert_eq!(parsed.file_name(), "отчёт.txt");
    }

    #[test]
    fn test_file_ref_parse_errors() {
        for bad in [
            "2024/01/01/id.txt?name=a",
            "://2024/01/01/id.txt?name=a",
            "minio://?name=a",
            "minio://2024/01/01/id.txt",
            "minio://2024/01/01/id.txt?name=%FF",
        ] {
            let result = bad.parse::<FileRef>();
            assert!(
                matches!(result, Err(FileStorageError::Configuration(_))),
                "expected error for {}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let stream: ReadStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]));
        assert_eq!(read_to_end(stream).await.unwrap(), b"abcd");
    }
}
