pub mod binary;
pub mod docx;
pub mod image;
pub mod ooxml;
pub mod pdf;
pub mod presentation;
pub mod spreadsheet;
pub mod text;

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};

use crate::config::{Config, PdfConfig, TableConfig};
use crate::error::panic_message;
use crate::format::{self, DocumentFamily};
use crate::markdown::{self, DocumentInfo, Extraction};

/// Metadata of the document being converted.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

impl SourceDocument {
    pub fn new(filename: &str, mime_type: &str, size: u64) -> Self {
        Self {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size,
        }
    }
}

pub trait DocumentProcessor: Send + Sync {
    fn process(&self, source: &SourceDocument, bytes: &[u8]) -> Extraction;
    fn supports(&self, family: DocumentFamily) -> bool;
}

pub struct ProcessorRegistry {
    processors: Vec<Box<dyn DocumentProcessor>>,
    fallback: text::TextProcessor,
}

impl ProcessorRegistry {
    pub fn new(pdf: &PdfConfig, tables: TableConfig) -> Self {
        Self::with_processors(vec![
            Box::new(image::ImageProcessor::new()),
            Box::new(pdf::PdfProcessor::from_config(pdf)),
            Box::new(docx::DocxProcessor::new()),
            Box::new(spreadsheet::SpreadsheetProcessor::new(tables)),
            Box::new(presentation::PresentationProcessor::new()),
            Box::new(text::TextProcessor::new()),
        ])
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.pdf, config.tables)
    }

    pub fn with_processors(processors: Vec<Box<dyn DocumentProcessor>>) -> Self {
        Self {
            processors,
            fallback: text::TextProcessor::new(),
        }
    }

    /// Converts a document to Markdown. Never fails: extraction problems
    /// surface as an error notice inside the returned document.
    pub fn dispatch(
        &self,
        source: &SourceDocument,
        bytes: &[u8],
        converted_at: DateTime<Utc>,
    ) -> String {
        let family = DocumentFamily::classify(&source.mime_type, &format::extension_of(&source.filename));
        let _span = tracing::info_span!("processor.dispatch", family = %family).entered();

        let processor: &dyn DocumentProcessor = self
            .processors
            .iter()
            .find(|p| p.supports(family))
            .map(|p| p.as_ref())
            .unwrap_or(&self.fallback);

        let extraction = match catch_unwind(AssertUnwindSafe(|| processor.process(source, bytes))) {
            Ok(extraction) => extraction,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("Extractor panicked on {}: {}", source.filename, message);
                Extraction::failed(format!("Conversion failed: {}", message))
            }
        };

        if let Extraction::Failed { reason } = &extraction {
            log::warn!("Conversion of {} produced a notice: {}", source.filename, reason);
        }

        let info = DocumentInfo {
            filename: source.filename.clone(),
            size: source.size,
            mime_type: source.mime_type.clone(),
            converted_at,
        };
        markdown::assemble(&info, &extraction)
    }
}
