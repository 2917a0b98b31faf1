use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::convert::task::{next_task_id, ConversionTask, ConvertTicket};
use crate::db::{Database, SqliteDocumentRepository};
use crate::document::{ConvertStatus, ConvertStatusView, Document, DocumentRepository, NewDocument};
use crate::error::{ConfigError, ConvertError, DocconvError, WorkerError};
use crate::format::{guess_mime, AdmissionPolicy};
use crate::pipeline::Pipeline;
use crate::processor::ProcessorRegistry;
use crate::sanitize::sanitize_filename;
use crate::storage::{self, ByteStore, FileStorage};
use crate::worker::{ConvertJob, DeadlineSupervisor, WorkerPool};

const QUEUE_FULL_MESSAGE: &str = "conversion queue is full";

/// An upload as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub project_id: i64,
    pub filename: String,
    /// May be empty; the type is then guessed from the file name.
    pub mime_type: String,
    pub uploaded_by: i64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReceipt {
    pub document_id: i64,
    pub original_filename: String,
    pub mime_type: String,
    pub file_size: u64,
}

/// Starts conversions and serves their results.
///
/// `start_convert` moves the record to `processing`, arms a deadline and
/// queues the attempt; it never waits on extraction. Status reads go
/// straight to the repository.
pub struct ConversionService {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ByteStore>,
    admission: AdmissionPolicy,
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    supervisor: DeadlineSupervisor,
    timeout: Duration,
}

pub struct ConversionServiceBuilder {
    repository: Option<Arc<dyn DocumentRepository>>,
    store: Option<Arc<dyn ByteStore>>,
    registry: Option<Arc<ProcessorRegistry>>,
    admission: AdmissionPolicy,
    timeout: Duration,
    workers: usize,
    queue_capacity: usize,
}

impl ConversionServiceBuilder {
    fn new() -> Self {
        let defaults = crate::config::ConversionConfig::default();
        Self {
            repository: None,
            store: None,
            registry: None,
            admission: AdmissionPolicy::default(),
            timeout: Duration::from_secs(defaults.timeout_secs),
            workers: defaults.worker_count,
            queue_capacity: defaults.queue_capacity,
        }
    }

    pub fn repository(mut self, repository: Arc<dyn DocumentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn byte_store(mut self, store: Arc<dyn ByteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: Arc<ProcessorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Spawns the worker pool and the deadline supervisor.
    pub fn build(self) -> Result<ConversionService, DocconvError> {
        let repository = self.repository.ok_or_else(|| missing("repository"))?;
        let store = self.store.ok_or_else(|| missing("byte store"))?;
        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(ProcessorRegistry::new(
                &crate::config::PdfConfig::default(),
                crate::config::TableConfig::default(),
            ))
        });

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&repository),
            Arc::clone(&store),
            registry,
        ));
        let supervisor = DeadlineSupervisor::start(Arc::clone(&repository))?;
        let pool = WorkerPool::new(Arc::clone(&pipeline), self.workers, self.queue_capacity)?;

        Ok(ConversionService {
            repository,
            store,
            admission: self.admission,
            pipeline,
            pool,
            supervisor,
            timeout: self.timeout,
        })
    }
}

fn missing(what: &str) -> DocconvError {
    ConfigError::Validation {
        message: format!("conversion service needs a {}", what),
    }
    .into()
}

impl ConversionService {
    pub fn builder() -> ConversionServiceBuilder {
        ConversionServiceBuilder::new()
    }

    /// Opens the SQLite database and the file store named by `config`.
    pub fn from_config(config: &Config) -> Result<Self, DocconvError> {
        let db = Database::open(&config.resolved_database_path())?;
        Self::builder()
            .repository(Arc::new(SqliteDocumentRepository::new(db)))
            .byte_store(Arc::new(FileStorage::new(&config.storage_directory)))
            .registry(Arc::new(ProcessorRegistry::from_config(config)))
            .admission(AdmissionPolicy::from_config(&config.admission))
            .timeout(Duration::from_secs(config.conversion.timeout_secs))
            .workers(config.conversion.worker_count)
            .queue_capacity(config.conversion.queue_capacity)
            .build()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Begins a conversion attempt and returns as soon as it is queued.
    pub fn start_convert(&self, document_id: i64) -> Result<ConvertTicket, ConvertError> {
        let document = self.require(document_id)?;
        if document.convert_status == ConvertStatus::Processing {
            return Err(ConvertError::AlreadyInProgress(document_id));
        }

        let task_id = next_task_id(document_id);
        if !self.repository.begin_conversion(document_id, &task_id)? {
            // lost the race to another start, or the record vanished
            return Err(match self.repository.get_by_id(document_id)? {
                Some(_) => ConvertError::AlreadyInProgress(document_id),
                None => ConvertError::NotFound(document_id),
            });
        }

        let task = Arc::new(ConversionTask::new(document_id, task_id.clone()));
        info!(
            "Starting conversion {} for document {} ({})",
            task_id, document_id, document.original_filename
        );

        if let Err(e) = self.supervisor.register(Arc::clone(&task), self.timeout) {
            self.pipeline
                .settle_failure(&task, &format!("failed to schedule conversion: {}", e));
            return Err(e.into());
        }

        match self.pool.try_submit(ConvertJob::new(Arc::clone(&task))) {
            Ok(()) => Ok(ConvertTicket {
                task_id,
                status: ConvertStatus::Processing,
            }),
            Err(WorkerError::QueueFull) => {
                warn!("Queue full; failing conversion {}", task_id);
                self.pipeline.settle_failure(&task, QUEUE_FULL_MESSAGE);
                Err(ConvertError::QueueFull)
            }
            Err(e) => {
                self.pipeline
                    .settle_failure(&task, &format!("failed to queue conversion: {}", e));
                Err(e.into())
            }
        }
    }

    pub fn get_convert_status(&self, document_id: i64) -> Result<ConvertStatusView, ConvertError> {
        self.repository
            .get_convert_status(document_id)?
            .ok_or(ConvertError::NotFound(document_id))
    }

    /// Admits, records and stores a new original.
    pub fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, ConvertError> {
        let mime_type = if request.mime_type.trim().is_empty() {
            guess_mime(&request.filename)
        } else {
            request.mime_type.clone()
        };
        let file_size = request.bytes.len() as u64;
        self.admission.validate_upload(file_size, &mime_type)?;

        let mut document = self.repository.create(&NewDocument {
            project_id: request.project_id,
            original_filename: request.filename.clone(),
            original_ref: String::new(),
            file_size,
            mime_type: mime_type.clone(),
            uploaded_by: request.uploaded_by,
        })?;

        let reference = storage::original_ref(
            request.project_id,
            document.id,
            Utc::now().timestamp(),
            &sanitize_filename(&request.filename),
        );
        if let Err(e) = self.store.write(&reference, &request.bytes) {
            if let Err(cleanup) = self.repository.delete(document.id) {
                warn!("Failed to remove record {} after write error: {}", document.id, cleanup);
            }
            return Err(e.into());
        }

        document.original_ref = reference.clone();
        if let Err(e) = self.repository.update(&document) {
            if let Err(cleanup) = self.store.delete(&reference) {
                warn!("Failed to remove {} after record update error: {}", reference, cleanup);
            }
            if let Err(cleanup) = self.repository.delete(document.id) {
                warn!("Failed to remove record {} after update error: {}", document.id, cleanup);
            }
            return Err(e.into());
        }
        debug!("Stored upload {} as document {}", request.filename, document.id);

        Ok(UploadReceipt {
            document_id: document.id,
            original_filename: document.original_filename,
            mime_type,
            file_size,
        })
    }

    pub fn list_documents(&self, project_id: i64) -> Result<Vec<Document>, ConvertError> {
        Ok(self.repository.list_by_project(project_id)?)
    }

    pub fn get_document(&self, document_id: i64) -> Result<Document, ConvertError> {
        self.require(document_id)
    }

    /// Returns `(filename, mime_type, bytes)` of the original upload.
    pub fn download_original(
        &self,
        document_id: i64,
    ) -> Result<(String, String, Vec<u8>), ConvertError> {
        let document = self.require(document_id)?;
        let bytes = self.store.read(&document.original_ref)?;
        Ok((document.original_filename, document.mime_type, bytes))
    }

    /// Returns `(converted_filename, bytes)` of a completed conversion.
    pub fn download_converted(&self, document_id: i64) -> Result<(String, Vec<u8>), ConvertError> {
        let document = self.require(document_id)?;
        let (filename, reference) = converted_output(&document)?;
        let bytes = self.store.read(&reference)?;
        Ok((filename, bytes))
    }

    pub fn preview_converted(&self, document_id: i64) -> Result<String, ConvertError> {
        let (_, bytes) = self.download_converted(document_id)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drops the Markdown output and returns the record to `none`.
    pub fn delete_converted(&self, document_id: i64) -> Result<(), ConvertError> {
        let document = self.require(document_id)?;
        if document.convert_status == ConvertStatus::Processing {
            return Err(ConvertError::AlreadyInProgress(document_id));
        }
        if !self.repository.reset_conversion(document_id)? {
            return Err(match self.repository.get_by_id(document_id)? {
                Some(_) => ConvertError::AlreadyInProgress(document_id),
                None => ConvertError::NotFound(document_id),
            });
        }

        if let Some(reference) = document.converted_ref.as_deref() {
            self.store.delete(reference)?;
        }
        info!("Deleted converted output of document {}", document_id);
        Ok(())
    }

    /// Removes the stored bytes, then the record.
    pub fn delete_document(&self, document_id: i64) -> Result<(), ConvertError> {
        let document = self.require(document_id)?;
        if document.convert_status == ConvertStatus::Processing {
            return Err(ConvertError::AlreadyInProgress(document_id));
        }

        if !document.original_ref.is_empty() {
            self.store.delete(&document.original_ref)?;
        }
        if let Some(reference) = document.converted_ref.as_deref() {
            self.store.delete(reference)?;
        }
        if !self.repository.delete(document_id)? {
            return Err(ConvertError::NotFound(document_id));
        }
        info!("Deleted document {}", document_id);
        Ok(())
    }

    /// Stops accepting work, fails queued attempts and joins every thread.
    /// Running attempts finish or hit their deadline first.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
        self.supervisor.shutdown();
    }

    fn require(&self, document_id: i64) -> Result<Document, ConvertError> {
        self.repository
            .get_by_id(document_id)?
            .ok_or(ConvertError::NotFound(document_id))
    }
}

fn converted_output(document: &Document) -> Result<(String, String), ConvertError> {
    if document.convert_status != ConvertStatus::Completed {
        return Err(ConvertError::NotConverted(document.id));
    }
    match (&document.converted_filename, &document.converted_ref) {
        (Some(filename), Some(reference)) => Ok((filename.clone(), reference.clone())),
        _ => Err(ConvertError::NotConverted(document.id)),
    }
}
