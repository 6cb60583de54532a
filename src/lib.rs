/*!
 * miniofs - file storage on MinIO and S3-compatible object stores
 *
 * - `storage`: the `FileStorage` abstraction, the MinIO adapter, a local
 *   filesystem storage and a name-based locator
 * - `protocol::s3`: object-store clients (AWS SDK or in-memory) and streaming
 *   multipart upload
 * - `management`: operator refresh of registered storages
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod config;
pub mod error;
pub mod logging;
pub mod management;
pub mod protocol;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigOverride, LogLevel, MinioConfig};
pub use error::{ErrorKind, FileStorageError, Result};
pub use management::StorageManagement;
pub use storage::{FileRef, FileStorage, FileStorageLocator, LocalFileStorage, MinioFileStorage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
