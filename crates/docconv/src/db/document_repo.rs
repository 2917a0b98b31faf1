//! Document repository over the `documents` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::document::{
    ConvertStatus, ConvertStatusView, Document, DocumentRepository, NewDocument, StatusUpdate,
};

const TABLE: &str = "documents";

/// A raw document row as stored in SQLite.
#[derive(Debug, Clone)]
struct DocumentRow {
    id: i64,
    project_id: i64,
    original_filename: String,
    original_ref: String,
    file_size: u64,
    mime_type: String,
    uploaded_by: i64,
    convert_status: String,
    convert_task_id: Option<String>,
    convert_progress: u8,
    converted_filename: Option<String>,
    converted_ref: Option<String>,
    converted_size: u64,
    converted_at: Option<String>,
    convert_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            original_filename: row.get("original_filename")?,
            original_ref: row.get("original_ref")?,
            file_size: row.get("file_size")?,
            mime_type: row.get("mime_type")?,
            uploaded_by: row.get("uploaded_by")?,
            convert_status: row.get("convert_status")?,
            convert_task_id: row.get("convert_task_id")?,
            convert_progress: row.get("convert_progress")?,
            converted_filename: row.get("converted_filename")?,
            converted_ref: row.get("converted_ref")?,
            converted_size: row.get("converted_size")?,
            converted_at: row.get("converted_at")?,
            convert_error: row.get("convert_error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_document(self) -> Result<Document, DatabaseError> {
        let convert_status = self
            .convert_status
            .parse::<ConvertStatus>()
            .map_err(|reason| DatabaseError::Corrupt { table: TABLE, reason })?;

        Ok(Document {
            id: self.id,
            project_id: self.project_id,
            original_filename: self.original_filename,
            original_ref: self.original_ref,
            file_size: self.file_size,
            mime_type: self.mime_type,
            uploaded_by: self.uploaded_by,
            convert_status,
            convert_task_id: self.convert_task_id,
            convert_progress: self.convert_progress,
            converted_filename: self.converted_filename,
            converted_ref: self.converted_ref,
            converted_size: self.converted_size,
            converted_at: self.converted_at.as_deref().map(parse_timestamp).transpose()?,
            convert_error: self.convert_error,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            table: TABLE,
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// SQLite-backed [`DocumentRepository`].
#[derive(Clone)]
pub struct SqliteDocumentRepository {
    db: Database,
}

impl SqliteDocumentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl DocumentRepository for SqliteDocumentRepository {
    fn create(&self, new: &NewDocument) -> Result<Document, DatabaseError> {
        let id = self.db.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO documents (project_id, original_filename, original_ref, file_size,
                 mime_type, uploaded_by, convert_status, convert_progress, converted_size,
                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'none', 0, 0, ?7, ?7)",
                params![
                    new.project_id,
                    new.original_filename,
                    new.original_ref,
                    new.file_size,
                    new.mime_type,
                    new.uploaded_by,
                    ts,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        self.get_by_id(id)?.ok_or_else(|| DatabaseError::Corrupt {
            table: TABLE,
            reason: format!("inserted row {} not readable", id),
        })
    }

    fn update(&self, document: &Document) -> Result<(), DatabaseError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE documents SET original_filename=?2, original_ref=?3, file_size=?4,
                 mime_type=?5, uploaded_by=?6, convert_status=?7, convert_task_id=?8,
                 convert_progress=?9, converted_filename=?10, converted_ref=?11,
                 converted_size=?12, converted_at=?13, convert_error=?14, updated_at=?15
                 WHERE id=?1",
                params![
                    document.id,
                    document.original_filename,
                    document.original_ref,
                    document.file_size,
                    document.mime_type,
                    document.uploaded_by,
                    document.convert_status.as_str(),
                    document.convert_task_id,
                    document.convert_progress,
                    document.converted_filename,
                    document.converted_ref,
                    document.converted_size,
                    document.converted_at.map(|t| t.to_rfc3339()),
                    document.convert_error,
                    now(),
                ],
            )?;
            Ok(())
        })
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Document>, DatabaseError> {
        let row = self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM documents WHERE id = ?1",
                    params![id],
                    DocumentRow::from_row,
                )
                .optional()?;
            Ok(row)
        })?;
        row.map(DocumentRow::into_document).transpose()
    }

    fn list_by_project(&self, project_id: i64) -> Result<Vec<Document>, DatabaseError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM documents WHERE project_id = ?1 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map(params![project_id], DocumentRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }

    fn begin_conversion(&self, id: i64, task_id: &str) -> Result<bool, DatabaseError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE documents SET convert_status='processing', convert_task_id=?2,
                 convert_progress=0, convert_error=NULL, converted_filename=NULL,
                 converted_ref=NULL, converted_size=0, converted_at=NULL, updated_at=?3
                 WHERE id=?1 AND convert_status != 'processing'",
                params![id, task_id, now()],
            )?;
            Ok(affected == 1)
        })
    }

    fn update_status(
        &self,
        id: i64,
        task_id: &str,
        update: &StatusUpdate,
    ) -> Result<bool, DatabaseError> {
        let ts = now();
        let converted_at = (update.status == ConvertStatus::Completed).then(|| ts.clone());
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE documents SET convert_status=?3, convert_progress=?4,
                 converted_filename=?5, converted_ref=?6, converted_size=?7,
                 converted_at=?8, convert_error=?9, updated_at=?10
                 WHERE id=?1 AND convert_task_id=?2 AND convert_status='processing'",
                params![
                    id,
                    task_id,
                    update.status.as_str(),
                    update.progress,
                    update.converted_filename,
                    update.converted_ref,
                    update.converted_size,
                    converted_at,
                    update.error,
                    ts,
                ],
            )?;
            Ok(affected == 1)
        })
    }

    fn reset_conversion(&self, id: i64) -> Result<bool, DatabaseError> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE documents SET convert_status='none', convert_task_id=NULL,
                 convert_progress=0, convert_error=NULL, converted_filename=NULL,
                 converted_ref=NULL, converted_size=0, converted_at=NULL, updated_at=?2
                 WHERE id=?1 AND convert_status != 'processing'",
                params![id, now()],
            )?;
            Ok(affected == 1)
        })
    }

    fn get_convert_status(&self, id: i64) -> Result<Option<ConvertStatusView>, DatabaseError> {
        let row = self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT convert_status, convert_progress, converted_filename, convert_error
                     FROM documents WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, u8>(1)?,
                            r.get::<_, Option<String>>(2)?,
                            r.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(status, progress, converted_filename, error)| {
            let status = status
                .parse::<ConvertStatus>()
                .map_err(|reason| DatabaseError::Corrupt { table: TABLE, reason })?;
            Ok(ConvertStatusView {
                status,
                progress,
                converted_filename,
                error,
            })
        })
        .transpose()
    }
}
