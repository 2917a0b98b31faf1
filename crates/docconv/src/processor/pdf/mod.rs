pub mod content_stream;
pub mod pdftotext;
pub mod positional;
pub mod quality;
pub mod text_objects;

#[cfg(test)]
pub(crate) mod fixtures;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::config::PdfConfig;
use crate::error::{panic_message, ExtractError};
use crate::format::DocumentFamily;
use crate::markdown::Extraction;
use crate::processor::{DocumentProcessor, SourceDocument};

const KIND_PDF: &str = "PDF document";

/// One way of pulling text out of PDF bytes.
pub trait PdfStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Ordered fallback over PDF strategies.
pub struct PdfChain {
    strategies: Vec<Box<dyn PdfStrategy>>,
}

impl PdfChain {
    pub fn from_config(config: &PdfConfig) -> Self {
        let mut strategies: Vec<Box<dyn PdfStrategy>> = Vec::new();
        if config.enable_pdftotext {
            strategies.push(Box::new(pdftotext::PdftotextStrategy::new(
                config.pdftotext_command.clone(),
                Duration::from_secs(config.pdftotext_timeout_secs),
            )));
        }
        strategies.push(Box::new(text_objects::TextObjectStrategy));
        strategies.push(Box::new(content_stream::ContentStreamStrategy));
        strategies.push(Box::new(positional::PositionalStrategy));
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn PdfStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the first non-blank result, or a placeholder notice when every
    /// strategy came up empty.
    pub fn run(&self, bytes: &[u8]) -> String {
        let mut skipped_pages = 0usize;

        for strategy in &self.strategies {
            let _span = tracing::info_span!("pdf.strategy", name = strategy.name()).entered();
            match catch_unwind(AssertUnwindSafe(|| strategy.extract(bytes))) {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    log::debug!("PDF text extracted with {}", strategy.name());
                    return text;
                }
                Ok(Ok(_)) => log::debug!("{} returned no text", strategy.name()),
                Ok(Err(ExtractError::NoText { skipped_pages: n })) => {
                    skipped_pages = skipped_pages.max(n);
                    log::debug!("{} found no text", strategy.name());
                }
                Ok(Err(e @ ExtractError::ToolUnavailable(_))) => {
                    log::debug!("{} skipped: {}", strategy.name(), e)
                }
                Ok(Err(e)) => log::warn!("{} failed: {}", strategy.name(), e),
                Err(payload) => log::warn!(
                    "{} panicked: {}",
                    strategy.name(),
                    panic_message(payload.as_ref())
                ),
            }
        }

        placeholder(skipped_pages)
    }
}

fn placeholder(skipped_pages: usize) -> String {
    if skipped_pages > 0 {
        format!(
            "(No text could be extracted; {} page(s) could not be parsed. This is likely a scanned/image-only PDF.)",
            skipped_pages
        )
    } else {
        "(No text could be extracted; this is likely a scanned/image-only PDF.)".to_string()
    }
}

pub struct PdfProcessor {
    chain: PdfChain,
}

impl PdfProcessor {
    pub fn new(chain: PdfChain) -> Self {
        Self { chain }
    }

    pub fn from_config(config: &PdfConfig) -> Self {
        Self::new(PdfChain::from_config(config))
    }
}

impl DocumentProcessor for PdfProcessor {
    fn process(&self, source: &SourceDocument, bytes: &[u8]) -> Extraction {
        let _span = tracing::info_span!("processor.pdf", file = %source.filename).entered();
        Extraction::document(KIND_PDF, self.chain.run(bytes))
    }

    fn supports(&self, family: DocumentFamily) -> bool {
        matches!(family, DocumentFamily::Pdf)
    }
}
