use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocconvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Reasons an upload is refused before any record is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("file size {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("file type '{0}' is not allowed")]
    MimeNotAllowed(String),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("document {0} not found")]
    NotFound(i64),

    #[error("document {0} is already being converted")]
    AlreadyInProgress(i64),

    #[error("document {0} has no completed conversion")]
    NotConverted(i64),

    #[error("conversion queue is full")]
    QueueFull,

    #[error("upload rejected: {0}")]
    Rejected(#[from] AdmissionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),
}

/// Failure of a single extraction strategy. Never reaches the caller; the
/// strategy chain logs it and moves on.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("external tool '{0}' is not available")]
    ToolUnavailable(String),

    #[error("external tool '{tool}' failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("PDF parse error: {0}")]
    Pdf(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("no usable text extracted")]
    NoText { skipped_pages: usize },

    #[error("extraction panicked: {0}")]
    Panicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for ExtractError {
    fn from(e: lopdf::Error) -> Self {
        ExtractError::Pdf(e.to_string())
    }
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        ExtractError::Archive(e.to_string())
    }
}

impl From<quick_xml::Error> for ExtractError {
    fn from(e: quick_xml::Error) -> Self {
        ExtractError::Xml(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete file '{path}': {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage reference: {0}")]
    InvalidReference(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full")]
    QueueFull,
}

/// Converts a caught panic payload into a readable message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub type Result<T> = std::result::Result<T, DocconvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_from_str_and_string() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom");

        let caught = std::panic::catch_unwind(|| panic!("{} pages", 3)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "3 pages");
    }

    #[test]
    fn test_admission_error_messages() {
        let err = AdmissionError::TooLarge { size: 10, max: 5 };
        assert_eq!(
            err.to_string(),
            "file size 10 bytes exceeds the maximum of 5 bytes"
        );
        let err = AdmissionError::MimeNotAllowed("application/x-foo".into());
        assert!(err.to_string().contains("application/x-foo"));
    }
}
