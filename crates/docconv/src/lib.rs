pub mod config;
pub mod convert;
pub mod db;
pub mod document;
pub mod encoding;
pub mod error;
pub mod format;
pub mod logging;
pub mod markdown;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod storage;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config};
pub use convert::{ConversionService, ConvertTicket, UploadReceipt, UploadRequest};
pub use document::{ConvertStatus, ConvertStatusView, Document, DocumentRepository};
pub use error::{
    AdmissionError, ConfigError, ConvertError, DocconvError, Result, StorageError, WorkerError,
};
pub use format::{AdmissionPolicy, DocumentFamily};
pub use processor::{ProcessorRegistry, SourceDocument};
pub use storage::{ByteStore, FileStorage};
