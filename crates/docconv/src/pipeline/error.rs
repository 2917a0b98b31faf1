use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::StorageError;

/// Reasons a conversion attempt stops before completing. The `Display` text
/// is what gets recorded as the document's `convert_error`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to load document: {0}")]
    Load(#[from] DatabaseError),

    #[error("document {0} not found")]
    NotFound(i64),

    #[error("failed to read file: {}", io_detail(.0))]
    ReadOriginal(StorageError),

    #[error("failed to create converted directory: {}", io_detail(.0))]
    CreateOutputDirectory(StorageError),

    #[error("failed to save converted file: {}", io_detail(.0))]
    SaveOutput(StorageError),

    /// Writing the terminal state failed after this attempt claimed it.
    #[error("failed to record conversion result: {0}")]
    Record(DatabaseError),

    /// The deadline fired or the attempt was otherwise cancelled.
    #[error("conversion cancelled")]
    Cancelled,

    /// A newer attempt replaced this one.
    #[error("conversion attempt superseded")]
    Superseded,
}

impl PipelineError {
    /// Whether the record should be marked failed. Cancelled and superseded
    /// attempts leave the record to whoever owns it now.
    pub fn is_recordable(&self) -> bool {
        !matches!(self, PipelineError::Cancelled | PipelineError::Superseded)
    }

    /// Maps a failed output write to the directory or file variant.
    pub fn from_output_write(err: StorageError) -> Self {
        match err {
            StorageError::CreateDirectory { .. } => PipelineError::CreateOutputDirectory(err),
            other => PipelineError::SaveOutput(other),
        }
    }
}

/// The underlying OS error when there is one, without the path.
fn io_detail(err: &StorageError) -> String {
    match err {
        StorageError::CreateDirectory { source, .. }
        | StorageError::WriteFile { source, .. }
        | StorageError::ReadFile { source, .. }
        | StorageError::DeleteFile { source, .. } => source.to_string(),
        StorageError::InvalidReference(_) => err.to_string(),
    }
}
