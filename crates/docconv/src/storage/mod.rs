pub mod filesystem;

pub use filesystem::FileStorage;

use crate::error::StorageError;

/// Keyed byte storage for originals and converted output. References are
/// relative, `/`-separated keys.
pub trait ByteStore: Send + Sync {
    fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError>;

    /// Writes bytes, creating parent directories as needed.
    fn write(&self, reference: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Removes the bytes. A reference that does not exist is not an error.
    fn delete(&self, reference: &str) -> Result<(), StorageError>;
}

/// `raw_documents/{project}/original/{id}_{unix}_{filename}`
pub fn original_ref(project_id: i64, document_id: i64, unix_secs: i64, filename: &str) -> String {
    format!(
        "raw_documents/{}/original/{}_{}_{}",
        project_id, document_id, unix_secs, filename
    )
}

/// `raw_documents/{project}/converted/{id}_{converted_filename}`
pub fn converted_ref(project_id: i64, document_id: i64, converted_filename: &str) -> String {
    format!(
        "raw_documents/{}/converted/{}_{}",
        project_id, document_id, converted_filename
    )
}
