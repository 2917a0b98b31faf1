use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use crate::convert::ConversionTask;
use crate::document::{ConvertStatus, DocumentRepository, StatusUpdate};
use crate::processor::{ProcessorRegistry, SourceDocument};
use crate::sanitize;
use crate::storage::{self, ByteStore};

use super::context::PipelineContext;
use super::error::PipelineError;

/// How a single attempt ended, from the worker's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { converted_filename: String },
    Failed { error: String },
    /// Another party owns the record's terminal state (deadline or newer attempt).
    Abandoned,
}

pub struct Pipeline {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ByteStore>,
    registry: Arc<ProcessorRegistry>,
}

impl Pipeline {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn ByteStore>,
        registry: Arc<ProcessorRegistry>,
    ) -> Self {
        Self {
            repository,
            store,
            registry,
        }
    }

    /// Run one conversion attempt to a terminal state.
    pub fn run(&self, task: Arc<ConversionTask>) -> JobOutcome {
        let mut ctx = PipelineContext::new(task);
        let _pipeline_span = info_span!("pipeline",
            task_id = %ctx.task.task_id(),
            document_id = ctx.task.document_id(),
            file = tracing::field::Empty,
        )
        .entered();

        match self.execute(&mut ctx) {
            Ok(()) => {
                let converted_filename = ctx.converted_filename.unwrap_or_default();
                info!("Converted document {} to {}", ctx.task.document_id(), converted_filename);
                JobOutcome::Completed { converted_filename }
            }
            Err(PipelineError::Record(e)) => {
                let error = format!("failed to record conversion result: {}", e);
                self.record_failure(&ctx.task, &error);
                JobOutcome::Failed { error }
            }
            Err(e) if e.is_recordable() => {
                let error = e.to_string();
                warn!("Conversion of document {} failed: {}", ctx.task.document_id(), error);
                if self.settle_failure(&ctx.task, &error) {
                    JobOutcome::Failed { error }
                } else {
                    JobOutcome::Abandoned
                }
            }
            Err(e) => {
                debug!("Attempt {} abandoned: {}", ctx.task.task_id(), e);
                JobOutcome::Abandoned
            }
        }
    }

    fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        // Step 1: Load record
        {
            let _step = info_span!("load_record").entered();
            self.step_load_record(ctx)?;
        }
        if let Some(document) = &ctx.document {
            let file = sanitize::redact_path(Path::new(&document.original_filename));
            tracing::Span::current().record("file", file.as_str());
        }
        checkpoint(ctx)?;

        // Step 2: Read original bytes
        {
            let _step = info_span!("read_original").entered();
            self.step_read_original(ctx)?;
        }
        checkpoint(ctx)?;

        // Step 3: Extract and assemble Markdown
        {
            let _step = info_span!("convert").entered();
            self.step_convert(ctx);
        }
        checkpoint(ctx)?;

        // Step 4: Write output
        {
            let _step = info_span!("write_output").entered();
            self.step_write_output(ctx)?;
        }

        // Step 5: Persist terminal state
        {
            let _step = info_span!("finalize").entered();
            self.step_finalize(ctx)
        }
    }

    fn step_load_record(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let id = ctx.task.document_id();
        let document = self
            .repository
            .get_by_id(id)?
            .ok_or(PipelineError::NotFound(id))?;

        let current = document.convert_task_id.as_deref() == Some(ctx.task.task_id());
        if !current || document.convert_status != ConvertStatus::Processing {
            return Err(PipelineError::Superseded);
        }

        debug!("Loaded record ({} bytes, {})", document.file_size, document.mime_type);
        ctx.document = Some(document);
        Ok(())
    }

    fn step_read_original(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let document = loaded(ctx)?;
        ctx.original = self
            .store
            .read(&document.original_ref)
            .map_err(PipelineError::ReadOriginal)?;
        Ok(())
    }

    fn step_convert(&self, ctx: &mut PipelineContext) {
        let Some(document) = ctx.document.as_ref() else {
            return;
        };
        let source = SourceDocument::new(
            &document.original_filename,
            &document.mime_type,
            document.file_size,
        );
        ctx.markdown = self.registry.dispatch(&source, &ctx.original, Utc::now());
    }

    fn step_write_output(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let document = loaded(ctx)?;
        let filename = sanitize::converted_filename(&document.original_filename, Utc::now().timestamp());
        let reference = storage::converted_ref(document.project_id, document.id, &filename);

        self.store
            .write(&reference, ctx.markdown.as_bytes())
            .map_err(PipelineError::from_output_write)?;

        ctx.converted_filename = Some(filename);
        ctx.converted_ref = Some(reference);
        Ok(())
    }

    fn step_finalize(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        if ctx.task.is_cancelled() || !ctx.task.try_settle() {
            return Err(PipelineError::Cancelled);
        }

        let update = StatusUpdate::completed(
            ctx.converted_filename.clone().unwrap_or_default(),
            ctx.converted_ref.clone().unwrap_or_default(),
            ctx.markdown.len() as u64,
        );
        match self
            .repository
            .update_status(ctx.task.document_id(), ctx.task.task_id(), &update)
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(PipelineError::Superseded),
            Err(e) => Err(PipelineError::Record(e)),
        }
    }

    /// Claims the attempt and marks it failed. Returns `false` when someone
    /// else already settled it.
    pub fn settle_failure(&self, task: &ConversionTask, error: &str) -> bool {
        if !task.try_settle() {
            debug!("Attempt {} already settled; dropping failure: {}", task.task_id(), error);
            return false;
        }
        self.record_failure(task, error);
        true
    }

    fn record_failure(&self, task: &ConversionTask, error: &str) {
        match self
            .repository
            .update_status(task.document_id(), task.task_id(), &StatusUpdate::failed(error))
        {
            Ok(true) => {}
            Ok(false) => debug!("Attempt {} no longer current; failure not recorded", task.task_id()),
            Err(e) => error!(
                "Failed to record failure for document {}: {}",
                task.document_id(),
                e
            ),
        }
    }
}

fn checkpoint(ctx: &PipelineContext) -> Result<(), PipelineError> {
    if ctx.task.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

fn loaded(ctx: &PipelineContext) -> Result<&crate::document::Document, PipelineError> {
    ctx.document
        .as_ref()
        .ok_or(PipelineError::NotFound(ctx.task.document_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PdfConfig, TableConfig};
    use crate::db::{Database, SqliteDocumentRepository};
    use crate::document::{Document, NewDocument};
    use crate::storage::FileStorage;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        repo: Arc<SqliteDocumentRepository>,
        store: Arc<FileStorage>,
        pipeline: Pipeline,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let repo = Arc::new(SqliteDocumentRepository::new(
            Database::open_in_memory().unwrap(),
        ));
        let store = Arc::new(FileStorage::new(temp_dir.path()));
        let pdf = PdfConfig {
            enable_pdftotext: false,
            ..PdfConfig::default()
        };
        let registry = Arc::new(ProcessorRegistry::new(&pdf, TableConfig::default()));
        let pipeline = Pipeline::new(repo.clone(), store.clone(), registry);
        Fixture {
            _temp_dir: temp_dir,
            repo,
            store,
            pipeline,
        }
    }

    fn seed(f: &Fixture, name: &str, bytes: Option<&[u8]>) -> Document {
        let reference = format!("raw_documents/1/original/{}", name);
        let doc = f
            .repo
            .create(&NewDocument {
                project_id: 1,
                original_filename: name.to_string(),
                original_ref: reference.clone(),
                file_size: bytes.map(|b| b.len() as u64).unwrap_or(0),
                mime_type: "text/plain".to_string(),
                uploaded_by: 1,
            })
            .unwrap();
        if let Some(bytes) = bytes {
            f.store.write(&reference, bytes).unwrap();
        }
        doc
    }

    fn begin(f: &Fixture, doc: &Document, task_id: &str) -> Arc<ConversionTask> {
        assert!(f.repo.begin_conversion(doc.id, task_id).unwrap());
        Arc::new(ConversionTask::new(doc.id, task_id))
    }

    #[test]
    fn test_run_completes_and_writes_output() {
        let f = fixture();
        let doc = seed(&f, "notes.txt", Some(b"hello"));
        let task = begin(&f, &doc, "t1");

        let outcome = f.pipeline.run(task.clone());
        assert!(matches!(outcome, JobOutcome::Completed { .. }));
        assert!(task.is_settled());

        let found = f.repo.get_by_id(doc.id).unwrap().unwrap();
        assert_eq!(found.convert_status, ConvertStatus::Completed);
        assert_eq!(found.convert_progress, 100);
        let name = found.converted_filename.unwrap();
        assert!(name.starts_with("notes_converted_") && name.ends_with(".md"));

        let md = f.store.read(&found.converted_ref.unwrap()).unwrap();
        assert_eq!(md.len() as u64, found.converted_size);
        assert!(String::from_utf8(md).unwrap().contains("```\nhello\n```"));
    }

    #[test]
    fn test_missing_original_fails_with_read_error() {
        let f = fixture();
        let doc = seed(&f, "gone.txt", None);
        let task = begin(&f, &doc, "t1");

        match f.pipeline.run(task) {
            JobOutcome::Failed { error } => assert!(error.starts_with("failed to read file: ")),
            other => panic!("Expected failure, got {:?}", other),
        }
        let found = f.repo.get_by_id(doc.id).unwrap().unwrap();
        assert_eq!(found.convert_status, ConvertStatus::Failed);
        assert!(found.convert_error.unwrap().starts_with("failed to read file: "));
        assert!(found.converted_ref.is_none());
    }

    #[test]
    fn test_cancelled_attempt_leaves_record_alone() {
        let f = fixture();
        let doc = seed(&f, "notes.txt", Some(b"hello"));
        let task = begin(&f, &doc, "t1");
        task.cancel();

        assert_eq!(f.pipeline.run(task), JobOutcome::Abandoned);
        let found = f.repo.get_by_id(doc.id).unwrap().unwrap();
        assert_eq!(found.convert_status, ConvertStatus::Processing);
    }

    #[test]
    fn test_pre_settled_attempt_does_not_overwrite() {
        let f = fixture();
        let doc = seed(&f, "notes.txt", Some(b"hello"));
        let task = begin(&f, &doc, "t1");
        assert!(task.try_settle());
        f.repo
            .update_status(doc.id, "t1", &StatusUpdate::failed("conversion timeout exceeded 1 seconds"))
            .unwrap();

        assert_eq!(f.pipeline.run(task), JobOutcome::Abandoned);
        let found = f.repo.get_by_id(doc.id).unwrap().unwrap();
        assert_eq!(found.convert_status, ConvertStatus::Failed);
        assert_eq!(
            found.convert_error.as_deref(),
            Some("conversion timeout exceeded 1 seconds")
        );
    }

    #[test]
    fn test_stale_task_is_superseded() {
        let f = fixture();
        let doc = seed(&f, "notes.txt", Some(b"hello"));
        begin(&f, &doc, "current");
        let stale = Arc::new(ConversionTask::new(doc.id, "older"));

        assert_eq!(f.pipeline.run(stale), JobOutcome::Abandoned);
        let found = f.repo.get_by_id(doc.id).unwrap().unwrap();
        assert_eq!(found.convert_task_id.as_deref(), Some("current"));
        assert_eq!(found.convert_status, ConvertStatus::Processing);
    }

    #[test]
    fn test_settle_failure_only_once() {
        let f = fixture();
        let doc = seed(&f, "notes.txt", Some(b"hello"));
        let task = begin(&f, &doc, "t1");

        assert!(f.pipeline.settle_failure(&task, "conversion queue is full"));
        assert!(!f.pipeline.settle_failure(&task, "second"));
        let view = f.repo.get_convert_status(doc.id).unwrap().unwrap();
        assert_eq!(view.error.as_deref(), Some("conversion queue is full"));
    }
}
