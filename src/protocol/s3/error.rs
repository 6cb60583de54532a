//! Error types for object-store transport calls

use std::io;
use thiserror::Error;

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Store error code for a bucket that does not exist
pub const NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// Store error code for a key that does not exist
pub const NO_SUCH_KEY: &str = "NoSuchKey";

/// Store error code for a request the credentials may not make
pub const ACCESS_DENIED: &str = "AccessDenied";

/// Error codes an existence check reports as "does not exist"
///
/// Everything else, permission failures included, is an error.
pub const NOT_FOUND_CODES: [&str; 2] = [NO_SUCH_BUCKET, NO_SUCH_KEY];

/// Errors that can occur while talking to the object store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Error response from the store with its error code
    #[error("S3 service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// Reading the caller's stream failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Multipart upload protocol violation
    #[error("Multipart upload error: {0}")]
    MultipartUpload(String),

    /// Client could not be built from the settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any other SDK failure
    #[error("AWS SDK error: {0}")]
    Sdk(String),
}

impl TransportError {
    pub fn service<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        TransportError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error code reported by the store, if the store answered
    pub fn code(&self) -> Option<&str> {
        match self {
            TransportError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True for the store codes that mean the object does not exist
    pub fn is_not_found(&self) -> bool {
        self.code()
            .is_some_and(|code| NOT_FOUND_CODES.contains(&code))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

#[cfg(feature = "s3-native")]
impl<E> From<aws_sdk_s3::error::SdkError<E>> for TransportError
where
    E: aws_sdk_s3::error::ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

        match &error {
            SdkError::ServiceError(context) => {
                let err = context.err();
                TransportError::Service {
                    code: err.code().unwrap_or("Unknown").to_string(),
                    message: err
                        .message()
                        .map(str::to_string)
                        .unwrap_or_else(|| DisplayErrorContext(&error).to_string()),
                }
            }
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                TransportError::Network(DisplayErrorContext(&error).to_string())
            }
            SdkError::ResponseError(_) => {
                TransportError::Network(format!("Response error: {}", DisplayErrorContext(&error)))
            }
            _ => TransportError::Sdk(DisplayErrorContext(&error).to_string()),
        }
    }
}
