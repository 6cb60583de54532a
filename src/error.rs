/*!
 * Error types for miniofs
 */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FileStorageError>;

/// Errors surfaced by file storages and the management surface
///
/// Transport failures are logged where they happen and reach callers only as
/// [`FileStorageError::Io`], so the boundary stays the same whichever object
/// store sits underneath.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileStorageError {
    /// Configuration rejected or a storage could not be located
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A storage operation failed for the named file
    #[error("{message}")]
    Io { file_name: String, message: String },
}

/// Coarse classification of [`FileStorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
}

impl FileStorageError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        FileStorageError::Configuration(message.into())
    }

    pub fn io<N: Into<String>, S: Into<String>>(file_name: N, message: S) -> Self {
        FileStorageError::Io {
            file_name: file_name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FileStorageError::Configuration(_) => ErrorKind::Configuration,
            FileStorageError::Io { .. } => ErrorKind::Io,
        }
    }

    /// File name the failed operation was working on, if any
    pub fn file_name(&self) -> Option<&str> {
        match self {
            FileStorageError::Io { file_name, .. } => Some(file_name),
            FileStorageError::Configuration(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FileStorageError::config("bucket must not be empty").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            FileStorageError::io("a.txt", "Could not save file a.txt.").kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_error_display_formats() {
        let err = FileStorageError::config("endpointUrl must not be empty");
        assert_eq!(
            err.to_string(),
            "Configuration error: endpointUrl must not be empty"
        );

        let err = FileStorageError::io("report.pdf", "Could not load file report.pdf.");
        assert_eq!(err.to_string(), "Could not load file report.pdf.");
        assert_eq!(err.file_name(), Some("report.pdf"));
    }

    #[test]
    fn test_configuration_has_no_file_name() {
        assert_eq!(FileStorageError::config("x").file_name(), None);
    }
}
