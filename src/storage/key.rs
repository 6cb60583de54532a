//! Object key generation
//!
//! Keys look like `2024/03/07/0b7f5c1e-93f4-4a63-9a07-6d2b4b0f5e21.pdf`: a
//! date directory, a random UUID, and the file's extension when there is one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time for key generation
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub DateTime<Utc>);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Build a new unique key for `file_name` stored at `now`
pub fn create_file_key(now: DateTime<Utc>, file_name: &str) -> String {
    format!("{}/{}", date_dir(now), uuid_file_name(file_name))
}

/// `YYYY/MM/DD` directory of a timestamp
pub fn date_dir(now: DateTime<Utc>) -> String {
    now.format("%Y/%m/%d").to_string()
}

fn uuid_file_name(file_name: &str) -> String {
    let id = Uuid::new_v4();
    match extension(file_name) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Text after the last dot of the last path segment, if not empty
pub fn extension(file_name: &str) -> Option<&str> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    base.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}
