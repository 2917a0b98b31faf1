use crate::encoding;
use crate::format::DocumentFamily;
use crate::markdown::Extraction;
use crate::processor::{DocumentProcessor, SourceDocument};

/// Fallback processor: decodes any byte buffer as text.
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for TextProcessor {
    fn process(&self, _source: &SourceDocument, bytes: &[u8]) -> Extraction {
        Extraction::PlainText {
            text: encoding::to_unicode_text(bytes),
        }
    }

    fn supports(&self, family: DocumentFamily) -> bool {
        matches!(family, DocumentFamily::PlainText)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_extraction() {
        let processor = TextProcessor::new();
        let source = SourceDocument::new("notes.txt", "text/plain", 11);
        let extraction = processor.process(&source, b"hello world");
        assert_eq!(
            extraction,
            Extraction::PlainText {
                text: "hello world".to_string()
            }
        );
    }

    #[test]
    fn test_binary_garbage_still_produces_text() {
        let processor = TextProcessor::new();
        let source = SourceDocument::new("blob.bin", "application/octet-stream", 4);
        match processor.process(&source, &[0xFF, 0x00, 0xFE, 0x41]) {
            Extraction::PlainText { text } => assert!(!text.is_empty()),
            other => panic!("Expected plain text, got {:?}", other),
        }
    }

    #[test]
    fn test_supports_only_plain_text() {
        let processor = TextProcessor::new();
        assert!(processor.supports(DocumentFamily::PlainText));
        assert!(!processor.supports(DocumentFamily::Pdf));
    }
}
