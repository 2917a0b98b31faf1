//! Isolated service instance for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use docconv::config::{PdfConfig, TableConfig};
use docconv::db::{Database, SqliteDocumentRepository};
use docconv::document::{ConvertStatusView, Document, DocumentRepository};
use docconv::error::StorageError;
use docconv::storage::{ByteStore, FileStorage};
use docconv::{ConversionService, ProcessorRegistry, UploadRequest};

pub const PROJECT_ID: i64 = 7;

/// File store whose reads stall, to hold a worker inside an attempt.
pub struct SlowStore {
    inner: FileStorage,
    read_delay: Duration,
}

impl ByteStore for SlowStore {
    fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        thread::sleep(self.read_delay);
        self.inner.read(reference)
    }

    fn write(&self, reference: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.inner.write(reference, bytes)
    }

    fn delete(&self, reference: &str) -> Result<(), StorageError> {
        self.inner.delete(reference)
    }
}

pub struct HarnessBuilder {
    timeout: Duration,
    workers: usize,
    queue_capacity: usize,
    read_delay: Option<Duration>,
}

impl HarnessBuilder {
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

    /// Every original read sleeps this long first.
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn build(self) -> TestHarness {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage_dir = temp_dir.path().join("storage");

        let db = Database::open(&temp_dir.path().join("docconv.db")).expect("Failed to open database");
        let repository = Arc::new(SqliteDocumentRepository::new(db));

        let files = FileStorage::new(&storage_dir);
        let store: Arc<dyn ByteStore> = match self.read_delay {
            Some(read_delay) => Arc::new(SlowStore {
                inner: files,
                read_delay,
            }),
            None => Arc::new(files),
        };

        // no external tools in tests
        let pdf = PdfConfig {
            enable_pdftotext: false,
            ..PdfConfig::default()
        };
        let service = ConversionService::builder()
            .repository(repository.clone())
            .byte_store(store)
            .registry(Arc::new(ProcessorRegistry::new(&pdf, TableConfig::default())))
            .timeout(self.timeout)
            .workers(self.workers)
            .queue_capacity(self.queue_capacity)
            .build()
            .expect("Failed to build conversion service");

        TestHarness {
            temp_dir,
            storage_dir,
            repository,
            service,
        }
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub storage_dir: PathBuf,
    pub repository: Arc<SqliteDocumentRepository>,
    pub service: ConversionService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            timeout: Duration::from_secs(30),
            workers: 2,
            queue_capacity: 8,
            read_delay: None,
        }
    }

    /// Uploads bytes and returns the new document id.
    pub fn upload(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> i64 {
        self.service
            .upload(UploadRequest {
                project_id: PROJECT_ID,
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                uploaded_by: 1,
                bytes: bytes.to_vec(),
            })
            .expect("upload failed")
            .document_id
    }

    pub fn document(&self, id: i64) -> Document {
        self.repository
            .get_by_id(id)
            .expect("database read failed")
            .expect("document missing")
    }

    /// Polls until the attempt leaves `processing`.
    pub fn wait_for_terminal(&self, id: i64, limit: Duration) -> ConvertStatusView {
        let started = Instant::now();
        loop {
            let view = self.service.get_convert_status(id).expect("status read failed");
            if view.status.is_terminal() {
                return view;
            }
            if started.elapsed() > limit {
                panic!("document {} still {} after {:?}", id, view.status, limit);
            }
            thread::sleep(Duration::from_millis(25));
        }
    }

    /// Uploads, converts and returns the Markdown.
    pub fn convert(&self, filename: &str, mime_type: &str, bytes: &[u8]) -> String {
        let id = self.upload(filename, mime_type, bytes);
        self.service.start_convert(id).expect("start_convert failed");
        let view = self.wait_for_terminal(id, Duration::from_secs(10));
        assert_eq!(
            view.status,
            docconv::ConvertStatus::Completed,
            "conversion failed: {:?}",
            view.error
        );
        self.service.preview_converted(id).expect("preview failed")
    }

    pub fn finish(self) {
        self.service.shutdown();
    }
}
