//! Error taxonomy
//!
//! Every core operation returns an explicit outcome. Module-level errors
//! (`ValidationError`, `StorageError`, `StoreError`, `ExportError`) convert
//! into the top-level [`Error`] so callers can match on one type.

use thiserror::Error;

use crate::document::CorruptNode;
use crate::export::ExportError;
use crate::storage::StorageError;
use crate::store::StoreError;

/// Input that was rejected before any state changed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}': only http and https are allowed")]
    UnsupportedScheme { scheme: String },

    #[error("Invalid {field} '{value}': expected a whole number of pixels")]
    InvalidDimension { field: &'static str, value: String },

    #[error("Project name is required")]
    EmptyProjectName,

    #[error("Invalid project name '{name}': {reason}")]
    MalformedProjectName { name: String, reason: String },

    #[error("Project name is too long ({len} characters, max {max})")]
    ProjectNameTooLong { len: usize, max: usize },

    #[error("Metadata title is required")]
    MissingTitle,

    #[error("A project needs at least one page to export")]
    NoPages,
}

/// Top-level error for Ketabi operations
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected input; nothing was changed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Content or title edit with no page selected
    #[error("No active page to edit")]
    NoActivePage,

    /// The project file could not be read
    #[error("Failed to read project: {0}")]
    ReadFailure(#[source] StorageError),

    /// The project file could not be written
    #[error("Failed to write project: {0}")]
    WriteFailure(#[source] StorageError),

    /// A single node failed its schema and was dropped
    #[error("Corrupt node at {}: {}", .0.path, .0.reason)]
    CorruptNode(CorruptNode),

    /// Anything a collaborator reported that doesn't fit elsewhere
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl Error {
    /// Whether the caller can recover locally (all current variants can)
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Unexpected(_))
    }

    /// Short message suitable for showing to a user
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(e) => e.to_string(),
            Error::NoActivePage => "Select a page first.".to_string(),
            Error::ReadFailure(_) => "Failed to read file.".to_string(),
            Error::WriteFailure(e) => match e.recovery_suggestion() {
                Some(hint) => format!("Failed to save changes. {}", hint),
                None => "Failed to save changes.".to_string(),
            },
            Error::CorruptNode(_) => "Some content could not be loaded and was skipped.".to_string(),
            Error::Unexpected(_) => "An unexpected error occurred.".to_string(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoActivePage => Error::NoActivePage,
        }
    }
}

impl From<ExportError> for Error {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Validation(e) => Error::Validation(e),
            ExportError::Serialize(e) => Error::Unexpected(e.to_string()),
            ExportError::Packaging(msg) => Error::Unexpected(msg),
        }
    }
}

/// Result alias for Ketabi operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_store_error_maps_to_no_active_page() {
        let err: Error = StoreError::NoActivePage.into();
        assert!(matches!(err, Error::NoActivePage));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_export_validation_maps_to_validation() {
        let err: Error = ExportError::Validation(ValidationError::NoPages).into();
        assert!(matches!(err, Error::Validation(ValidationError::NoPages)));
    }

    #[test]
    fn test_write_failure_message_includes_hint() {
        let storage = StorageError::DiskFull {
            path: PathBuf::from("/full/book.ketabi"),
            source: io::Error::new(io::ErrorKind::Other, "No space left on device"),
        };
        let msg = Error::WriteFailure(storage).user_message();
        assert!(msg.starts_with("Failed to save changes."));
        assert!(msg.contains("disk space"));
    }

    #[test]
    fn test_unexpected_is_not_recoverable() {
        assert!(!Error::Unexpected("boom".into()).is_recoverable());
    }

    #[test]
    fn test_validation_display() {
        let err = ValidationError::UnsupportedScheme {
            scheme: "ftp".into(),
        };
        assert!(err.to_string().contains("ftp"));
    }
}
