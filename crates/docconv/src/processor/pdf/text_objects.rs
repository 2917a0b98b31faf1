use std::panic::{catch_unwind, AssertUnwindSafe};

use lopdf::Document;

use crate::error::{panic_message, ExtractError};

use super::quality::{clean_pdf_text, quality_score, MIN_PAGE_QUALITY};
use super::PdfStrategy;

/// Per-page text from lopdf's text-object reader, filtered by quality score.
pub struct TextObjectStrategy;

impl PdfStrategy for TextObjectStrategy {
    fn name(&self) -> &'static str {
        "text-objects"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let doc = Document::load_mem(bytes)?;
        let mut out = String::new();

        for page_num in doc.get_pages().keys().copied() {
            let page = catch_unwind(AssertUnwindSafe(|| doc.extract_text(&[page_num])));
            let raw = match page {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    log::debug!("text-objects: page {} unreadable: {}", page_num, e);
                    continue;
                }
                Err(payload) => {
                    log::warn!(
                        "text-objects: page {} panicked: {}",
                        page_num,
                        panic_message(payload.as_ref())
                    );
                    continue;
                }
            };

            if let Some(text) = screen_page(page_num, &raw) {
                out.push_str(&format!("### Page {}\n\n{}\n\n", page_num, text));
            }
        }

        if out.is_empty() {
            return Err(ExtractError::NoText { skipped_pages: 0 });
        }
        Ok(out)
    }
}

/// Scores the page as extracted and cleans it only when it clears the
/// quality bar. Cleanup removes the very glyphs the score counts against.
fn screen_page(page_num: u32, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let score = quality_score(raw);
    if score <= MIN_PAGE_QUALITY {
        log::debug!(
            "text-objects: dropping page {} (quality {:.2})",
            page_num,
            score
        );
        return None;
    }
    let text = clean_pdf_text(raw);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
