//! Document family classification and upload admission.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::schema::AdmissionConfig;
use crate::error::AdmissionError;

pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/bmp",
    "image/tiff",
    "image/gif",
    "image/webp",
];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "gif", "webp"];

/// Closed set of document families the dispatcher routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFamily {
    Image,
    Pdf,
    Word,
    Excel,
    PowerPoint,
    PlainText,
}

impl DocumentFamily {
    /// Classifies a document from its declared MIME type and file extension.
    ///
    /// A recognized MIME type decides the family; the extension only routes
    /// documents whose MIME type is missing or generic. Anything unrecognized
    /// is `PlainText`.
    pub fn classify(mime_type: &str, extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        Self::from_mime(&normalize_mime(mime_type))
            .or_else(|| Self::from_extension(&ext))
            .unwrap_or(DocumentFamily::PlainText)
    }

    fn from_mime(mime: &str) -> Option<Self> {
        let family = match mime {
            m if IMAGE_MIME_TYPES.contains(&m) => DocumentFamily::Image,
            MIME_PDF => DocumentFamily::Pdf,
            MIME_DOCX | MIME_DOC => DocumentFamily::Word,
            MIME_XLSX | MIME_XLS | MIME_CSV => DocumentFamily::Excel,
            MIME_PPTX | MIME_PPT => DocumentFamily::PowerPoint,
            _ => return None,
        };
        Some(family)
    }

    fn from_extension(ext: &str) -> Option<Self> {
        let family = match ext {
            e if IMAGE_EXTENSIONS.contains(&e) => DocumentFamily::Image,
            "pdf" => DocumentFamily::Pdf,
            "docx" | "doc" => DocumentFamily::Word,
            "xlsx" | "xls" | "csv" => DocumentFamily::Excel,
            "pptx" | "ppt" => DocumentFamily::PowerPoint,
            _ => return None,
        };
        Some(family)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFamily::Image => "image",
            DocumentFamily::Pdf => "pdf",
            DocumentFamily::Word => "word",
            DocumentFamily::Excel => "excel",
            DocumentFamily::PowerPoint => "powerpoint",
            DocumentFamily::PlainText => "plaintext",
        }
    }
}

impl fmt::Display for DocumentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercases a MIME type and strips parameters such as `; charset=utf-8`.
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Guesses a MIME type from a file name, falling back to
/// `application/octet-stream`.
pub fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(MIME_OCTET_STREAM)
        .to_string()
}

/// Size and type limits applied to uploads.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    max_upload_size: u64,
    allowed_mime_types: Vec<String>,
}

impl AdmissionPolicy {
    pub fn new(max_upload_size: u64, allowed_mime_types: Vec<String>) -> Self {
        let allowed_mime_types = allowed_mime_types
            .iter()
            .map(|m| normalize_mime(m))
            .collect();
        Self {
            max_upload_size,
            allowed_mime_types,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.max_upload_size, config.allowed_mime_types.clone())
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Pure admission check; performs no I/O.
    pub fn validate_upload(&self, size: u64, mime_type: &str) -> Result<(), AdmissionError> {
        if size > self.max_upload_size {
            return Err(AdmissionError::TooLarge {
                size,
                max: self.max_upload_size,
            });
        }

        let mime = normalize_mime(mime_type);
        if !self.allowed_mime_types.iter().any(|m| *m == mime) {
            return Err(AdmissionError::MimeNotAllowed(mime_type.to_string()));
        }

        Ok(())
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_config(&AdmissionConfig::default())
    }
}
