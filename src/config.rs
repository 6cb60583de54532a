/*!
 * Configuration types for miniofs
 */

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FileStorageError, Result};

/// Default upload part size (5 MiB, the S3 minimum)
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Smallest part size S3 accepts for a multipart upload
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part size S3 accepts (5 GiB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Prefix of the environment variables read by [`MinioConfig::from_env`]
pub const ENV_PREFIX: &str = "MINIOFS_";

/// Connection settings of a MinIO / S3 file storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinioConfig {
    /// MinIO or Amazon S3 access key
    #[serde(default)]
    pub access_key: Option<String>,

    /// MinIO or Amazon S3 secret key
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Amazon S3 region
    #[serde(default)]
    pub region: Option<String>,

    /// MinIO or Amazon S3 bucket name
    #[serde(default)]
    pub bucket: String,

    /// Upload part size in bytes, between 5 MiB and 5 GiB inclusive
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// MinIO or Amazon S3 endpoint URL
    #[serde(default)]
    pub endpoint_url: String,
}

impl Default for MinioConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            region: None,
            bucket: String::new(),
            part_size: DEFAULT_PART_SIZE,
            endpoint_url: String::new(),
        }
    }
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

impl MinioConfig {
    pub fn new(endpoint_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Check the settings a client cannot be built without
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_url.is_empty() {
            return Err(FileStorageError::config("endpointUrl must not be empty"));
        }

        if self.bucket.is_empty() {
            return Err(FileStorageError::config("bucket must not be empty"));
        }

        if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&self.part_size) {
            return Err(FileStorageError::config(format!(
                "partSize {} must be between {} and {} bytes",
                self.part_size, MIN_PART_SIZE, MAX_PART_SIZE
            )));
        }

        Ok(())
    }

    /// True when both keys are set and static credentials will be used
    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }

    /// Merge a partial configuration onto this one
    pub fn apply(&mut self, overrides: &ConfigOverride) {
        if overrides.environment_credentials {
            self.access_key = None;
            self.secret_key = None;
        }
        if let Some(access_key) = &overrides.access_key {
            self.access_key = Some(access_key.clone());
        }
        if let Some(secret_key) = &overrides.secret_key {
            self.secret_key = Some(secret_key.clone());
        }
        if overrides.clear_region {
            self.region = None;
        }
        if let Some(region) = &overrides.region {
            self.region = Some(region.clone());
        }
        if let Some(bucket) = &overrides.bucket {
            self.bucket = bucket.clone();
        }
        if let Some(part_size) = overrides.part_size {
            self.part_size = part_size;
        }
        if let Some(endpoint_url) = &overrides.endpoint_url {
            self.endpoint_url = endpoint_url.clone();
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FileStorageError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            FileStorageError::config(format!("Cannot parse {}: {}", path.display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| FileStorageError::config(format!("Cannot serialize config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| {
            FileStorageError::config(format!("Cannot write {}: {}", path.display(), e))
        })
    }

    /// Load configuration from `MINIOFS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|value| !value.is_empty())
        };

        let part_size = match var("PART_SIZE") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                FileStorageError::config(format!("{}PART_SIZE '{}': {}", ENV_PREFIX, raw, e))
            })?,
            None => DEFAULT_PART_SIZE,
        };

        Ok(Self {
            access_key: var("ACCESS_KEY"),
            secret_key: var("SECRET_KEY"),
            region: var("REGION"),
            bucket: var("BUCKET").unwrap_or_default(),
            part_size,
            endpoint_url: var("ENDPOINT_URL").unwrap_or_default(),
        })
    }
}

/// Partial configuration merged onto a storage's current settings
///
/// `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverride {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub part_size: Option<u64>,
    pub endpoint_url: Option<String>,

    /// Drop configured keys so credentials come from the environment
    #[serde(default)]
    pub environment_credentials: bool,

    /// Drop the configured region so the client default applies
    #[serde(default)]
    pub clear_region: bool,
}

impl ConfigOverride {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override only the key pair
    pub fn credentials(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            ..Default::default()
        }
    }

    /// Switch to environment-sourced credentials
    pub fn environment_credentials() -> Self {
        Self {
            environment_credentials: true,
            ..Default::default()
        }
    }

    /// Override every field with the given configuration
    pub fn replace_all(config: &MinioConfig) -> Self {
        Self {
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            region: config.region.clone(),
            bucket: Some(config.bucket.clone()),
            part_size: Some(config.part_size),
            endpoint_url: Some(config.endpoint_url.clone()),
            environment_credentials: !config.has_static_credentials(),
            clear_region: config.region.is_none(),
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    pub fn endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }
}

/// Log level for diagnostic output
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
