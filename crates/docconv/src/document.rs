//! Document records and the repository seam the conversion service writes through.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Lifecycle of a document's Markdown conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertStatus {
    #[default]
    None,
    Processing,
    Completed,
    Failed,
}

impl ConvertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvertStatus::None => "none",
            ConvertStatus::Processing => "processing",
            ConvertStatus::Completed => "completed",
            ConvertStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConvertStatus::Completed | ConvertStatus::Failed)
    }
}

impl fmt::Display for ConvertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(ConvertStatus::None),
            "processing" => Ok(ConvertStatus::Processing),
            "completed" => Ok(ConvertStatus::Completed),
            "failed" => Ok(ConvertStatus::Failed),
            other => Err(format!("unknown convert status '{}'", other)),
        }
    }
}

/// A stored upload and the state of its latest conversion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub project_id: i64,
    pub original_filename: String,
    pub original_ref: String,
    pub file_size: u64,
    pub mime_type: String,
    pub uploaded_by: i64,
    pub convert_status: ConvertStatus,
    pub convert_task_id: Option<String>,
    pub convert_progress: u8,
    pub converted_filename: Option<String>,
    pub converted_ref: Option<String>,
    pub converted_size: u64,
    pub converted_at: Option<DateTime<Utc>>,
    pub convert_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a document record is first created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub project_id: i64,
    pub original_filename: String,
    pub original_ref: String,
    pub file_size: u64,
    pub mime_type: String,
    pub uploaded_by: i64,
}

/// Snapshot returned to status pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertStatusView {
    pub status: ConvertStatus,
    pub progress: u8,
    pub converted_filename: Option<String>,
    pub error: Option<String>,
}

/// Terminal outcome of one conversion attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ConvertStatus,
    pub progress: u8,
    pub converted_filename: Option<String>,
    pub converted_ref: Option<String>,
    pub converted_size: u64,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn completed(filename: String, reference: String, size: u64) -> Self {
        Self {
            status: ConvertStatus::Completed,
            progress: 100,
            converted_filename: Some(filename),
            converted_ref: Some(reference),
            converted_size: size,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ConvertStatus::Failed,
            progress: 0,
            converted_filename: None,
            converted_ref: None,
            converted_size: 0,
            error: Some(error.into()),
        }
    }
}

pub trait DocumentRepository: Send + Sync {
    fn create(&self, new: &NewDocument) -> Result<Document, DatabaseError>;

    fn update(&self, document: &Document) -> Result<(), DatabaseError>;

    fn get_by_id(&self, id: i64) -> Result<Option<Document>, DatabaseError>;

    fn list_by_project(&self, project_id: i64) -> Result<Vec<Document>, DatabaseError>;

    /// Returns whether a record was removed.
    fn delete(&self, id: i64) -> Result<bool, DatabaseError>;

    /// Moves the record to `processing` under a fresh task id unless an
    /// attempt is already running. Clears the previous attempt's output and
    /// error. Returns `false` when the record is processing or missing.
    fn begin_conversion(&self, id: i64, task_id: &str) -> Result<bool, DatabaseError>;

    /// Writes a terminal state, but only while `task_id` is still the
    /// current attempt and the record is `processing`.
    fn update_status(
        &self,
        id: i64,
        task_id: &str,
        update: &StatusUpdate,
    ) -> Result<bool, DatabaseError>;

    /// Returns the record to `none` and forgets the last attempt's output,
    /// error and task id. Refused (`false`) while an attempt is running.
    fn reset_conversion(&self, id: i64) -> Result<bool, DatabaseError>;

    fn get_convert_status(&self, id: i64) -> Result<Option<ConvertStatusView>, DatabaseError>;
}
