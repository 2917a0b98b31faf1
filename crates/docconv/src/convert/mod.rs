//! Conversion orchestration: attempt state and the public service.

pub mod service;
pub mod task;

pub use service::{ConversionService, ConversionServiceBuilder, UploadReceipt, UploadRequest};
pub use task::{next_task_id, ConversionTask, ConvertTicket};
