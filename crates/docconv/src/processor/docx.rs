use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::error::ExtractError;
use crate::format::{self, DocumentFamily};
use crate::markdown::Extraction;
use crate::processor::{binary, ooxml, DocumentProcessor, SourceDocument};

const KIND_DOCX: &str = "Word document (DOCX)";
const KIND_DOC: &str = "Word document (DOC, reduced fidelity)";
const EMPTY_NOTICE: &str = "(The Word document is empty or its text could not be extracted.)";
const LEGACY_UNSUPPORTED: &str =
    "The legacy DOC format is not fully supported; please convert it to DOCX and upload again.";

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub struct DocxProcessor;

impl DocxProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for DocxProcessor {
    fn process(&self, source: &SourceDocument, bytes: &[u8]) -> Extraction {
        if is_legacy_doc(source, bytes) {
            return extract_legacy(bytes);
        }

        match extract_text_from_docx(bytes) {
            Ok(text) if text.is_empty() => Extraction::document(KIND_DOCX, EMPTY_NOTICE),
            Ok(text) => Extraction::document(KIND_DOCX, text),
            Err(e) => {
                log::warn!("DOCX extraction failed for {}: {}", source.filename, e);
                Extraction::failed(format!("DOCX conversion failed: {}", e))
            }
        }
    }

    fn supports(&self, family: DocumentFamily) -> bool {
        matches!(family, DocumentFamily::Word)
    }
}

fn is_legacy_doc(source: &SourceDocument, bytes: &[u8]) -> bool {
    if ooxml::is_legacy_container(bytes) {
        return true;
    }
    let ext = format::extension_of(&source.filename);
    ext == "doc" || (ext != "docx" && format::normalize_mime(&source.mime_type) == format::MIME_DOC)
}

fn extract_legacy(bytes: &[u8]) -> Extraction {
    let text = binary::scan_printable_text(bytes);
    if text.is_empty() {
        Extraction::failed(LEGACY_UNSUPPORTED)
    } else {
        Extraction::document(KIND_DOC, text)
    }
}

/// Extracts paragraph text from `word/document.xml`, skipping runs formatted
/// with single or double strikethrough.
pub fn extract_text_from_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = ooxml::open_archive(bytes)?;
    let xml = ooxml::read_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| ExtractError::Archive("word/document.xml not found".to_string()))?;

    let text = parse_document_xml(&xml)?;
    Ok(normalize(&text))
}

fn parse_document_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();

    let mut in_run = false;
    let mut in_run_props = false;
    let mut run_struck = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"r" => {
                    in_run = true;
                    run_struck = false;
                }
                b"rPr" if in_run => in_run_props = true,
                b"strike" | b"dstrike" if in_run_props => {
                    run_struck = ooxml::toggle_enabled(&e);
                }
                b"t" if in_run => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"strike" | b"dstrike" if in_run_props => {
                    run_struck = ooxml::toggle_enabled(&e);
                }
                b"tab" if in_run && !in_run_props && !run_struck => out.push('\t'),
                b"br" | b"cr" if in_run && !in_run_props => out.push('\n'),
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => {
                    in_run = false;
                    in_run_props = false;
                    run_struck = false;
                }
                b"rPr" => in_run_props = false,
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text && !run_struck => out.push_str(&ooxml::text_content(&t)),
            Event::GeneralRef(r) if in_text && !run_struck => {
                out.push_str(&ooxml::resolve_reference(&r))
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

fn normalize(text: &str) -> String {
    let trimmed_lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = trimmed_lines.join("\n");
    EXCESS_NEWLINES
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}
