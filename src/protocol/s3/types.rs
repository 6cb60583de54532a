//! Value types exchanged with an object-store transport

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::time::SystemTime;

/// Async stream of object bytes handed back by a GET
pub type ReadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Information about one uploaded part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPartInfo {
    /// Part number (1-indexed)
    pub part_number: i32,

    /// ETag of the uploaded part
    pub etag: String,

    /// Size of the part in bytes
    pub size: usize,
}

impl UploadPartInfo {
    pub fn new(part_number: i32, etag: String, size: usize) -> Self {
        Self {
            part_number,
            etag,
            size,
        }
    }
}

/// Result of a STAT/HEAD call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStat {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<SystemTime>,
}
