use crate::format::{self, DocumentFamily};
use crate::markdown::Extraction;
use crate::processor::{DocumentProcessor, SourceDocument};

/// Embeds image files whole; no text is extracted.
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for ImageProcessor {
    fn process(&self, source: &SourceDocument, bytes: &[u8]) -> Extraction {
        Extraction::Image {
            mime_type: image_mime(source),
            bytes: bytes.to_vec(),
        }
    }

    fn supports(&self, family: DocumentFamily) -> bool {
        matches!(family, DocumentFamily::Image)
    }
}

/// Declared MIME type when it is an image type, otherwise a guess from the
/// file name.
fn image_mime(source: &SourceDocument) -> String {
    let declared = format::normalize_mime(&source.mime_type);
    if declared.starts_with("image/") {
        return declared;
    }
    format::guess_mime(&source.filename)
}
