use serde::{Deserialize, Serialize};

use crate::format::{MIME_CSV, MIME_DOC, MIME_DOCX, MIME_PDF, MIME_PPT, MIME_PPTX, MIME_XLS, MIME_XLSX};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root directory the byte store maps references under.
    pub storage_directory: String,
    /// SQLite database file. Defaults to `docconv.db` inside the storage directory.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub tables: TableConfig,
}

impl Config {
    /// Builds a config with default sections around a storage directory.
    pub fn with_storage_directory(storage_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            storage_directory: storage_directory.into(),
            database_path: None,
            admission: AdmissionConfig::default(),
            conversion: ConversionConfig::default(),
            pdf: PdfConfig::default(),
            tables: TableConfig::default(),
        }
    }

    pub fn resolved_database_path(&self) -> std::path::PathBuf {
        match &self.database_path {
            Some(path) => std::path::PathBuf::from(path),
            None => std::path::Path::new(&self.storage_directory).join("docconv.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        MIME_PDF,
        MIME_DOC,
        MIME_DOCX,
        "text/plain",
        "image/png",
        "image/jpeg",
        "image/bmp",
        "image/tiff",
        "image/gif",
        "image/webp",
        MIME_XLS,
        MIME_XLSX,
        MIME_CSV,
        MIME_PPT,
        MIME_PPTX,
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Wall-clock deadline for a single conversion attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_true")]
    pub enable_pdftotext: bool,
    #[serde(default = "default_pdftotext_command")]
    pub pdftotext_command: String,
    #[serde(default = "default_pdftotext_timeout_secs")]
    pub pdftotext_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_pdftotext_command() -> String {
    "pdftotext".to_string()
}

fn default_pdftotext_timeout_secs() -> u64 {
    30
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            enable_pdftotext: true,
            pdftotext_command: default_pdftotext_command(),
            pdftotext_timeout_secs: default_pdftotext_timeout_secs(),
        }
    }
}

/// Limits applied when rendering spreadsheet grids as Markdown tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
    /// Includes the header row.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_max_columns() -> usize {
    20
}

fn default_max_rows() -> usize {
    1000
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_columns: default_max_columns(),
            max_rows: default_max_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let json = r#"{ "version": "1.0", "storage_directory": "/tmp/docs" }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.admission.max_upload_size, 100 * 1024 * 1024);
        assert!(config
            .admission
            .allowed_mime_types
            .contains(&"application/pdf".to_string()));
        assert_eq!(config.conversion.timeout_secs, 60);
        assert!(config.conversion.worker_count > 0);
        assert_eq!(config.conversion.queue_capacity, 64);
        assert!(config.pdf.enable_pdftotext);
        assert_eq!(config.pdf.pdftotext_command, "pdftotext");
        assert_eq!(config.tables.max_columns, 20);
        assert_eq!(config.tables.max_rows, 1000);
    }

    #[test]
    fn test_resolved_database_path() {
        let mut config = Config::with_storage_directory("/srv/docs");
        assert_eq!(
            config.resolved_database_path(),
            std::path::PathBuf::from("/srv/docs/docconv.db")
        );

        config.database_path = Some("/var/lib/docconv.db".into());
        assert_eq!(
            config.resolved_database_path(),
            std::path::PathBuf::from("/var/lib/docconv.db")
        );
    }
}
