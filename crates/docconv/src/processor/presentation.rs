use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::error::ExtractError;
use crate::format::{self, DocumentFamily};
use crate::markdown::Extraction;
use crate::processor::{binary, ooxml, DocumentProcessor, SourceDocument};

const KIND_PPTX: &str = "PowerPoint presentation (PPTX)";
const KIND_PPT: &str = "PowerPoint presentation (PPT, reduced fidelity)";
const NO_TEXT: &str =
    "No text could be extracted from this presentation. Legacy PPT files should be converted to PPTX.";

static SLIDE_MEMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

pub struct PresentationProcessor;

impl PresentationProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PresentationProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for PresentationProcessor {
    fn process(&self, source: &SourceDocument, bytes: &[u8]) -> Extraction {
        let legacy =
            format::extension_of(&source.filename) == "ppt" || ooxml::is_legacy_container(bytes);

        if !legacy {
            match extract_slides(bytes) {
                Ok(slides) if !slides.is_empty() => {
                    return Extraction::document(KIND_PPTX, render_slides(&slides));
                }
                Ok(_) => log::debug!("No slides found in {}", source.filename),
                Err(e) => log::warn!("PPTX extraction failed for {}: {}", source.filename, e),
            }
        }

        let text = binary::scan_printable_text(bytes);
        if text.is_empty() {
            Extraction::failed(NO_TEXT)
        } else {
            Extraction::document(KIND_PPT, text)
        }
    }

    fn supports(&self, family: DocumentFamily) -> bool {
        matches!(family, DocumentFamily::PowerPoint)
    }
}

/// Text of one slide, keyed by the number in its member name.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub number: u32,
    pub paragraphs: Vec<String>,
}

/// Reads slide members in numeric order.
pub fn extract_slides(bytes: &[u8]) -> Result<Vec<Slide>, ExtractError> {
    let mut archive = ooxml::open_archive(bytes)?;

    let mut members: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            SLIDE_MEMBER
                .captures(name)
                .and_then(|c| c[1].parse::<u32>().ok())
                .map(|n| (n, name.to_string()))
        })
        .collect();
    members.sort_by_key(|(n, _)| *n);

    let mut slides = Vec::with_capacity(members.len());
    for (number, member) in members {
        let xml = ooxml::read_entry(&mut archive, &member)?.unwrap_or_default();
        slides.push(Slide {
            number,
            paragraphs: parse_slide_xml(&xml)?,
        });
    }
    Ok(slides)
}

/// Collects `a:t` text per `a:p`, skipping runs with single or double
/// strikethrough.
fn parse_slide_xml(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut run_struck = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"r" => run_struck = false,
                b"rPr" => run_struck = is_struck(&e),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"rPr" {
                    run_struck = is_struck(&e);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                b"r" => run_struck = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text && !run_struck => current.push_str(&ooxml::text_content(&t)),
            Event::GeneralRef(r) if in_text && !run_struck => {
                current.push_str(&ooxml::resolve_reference(&r))
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn is_struck(e: &quick_xml::events::BytesStart<'_>) -> bool {
    matches!(
        ooxml::attr(e, b"strike").as_deref(),
        Some("sngStrike") | Some("dblStrike")
    )
}

fn render_slides(slides: &[Slide]) -> String {
    let mut out = String::new();
    for slide in slides {
        out.push_str(&format!("### Slide {}\n\n", slide.number));
        if !slide.paragraphs.is_empty() {
            out.push_str(&slide.paragraphs.join("\n\n"));
            out.push_str("\n\n");
        }
    }
    out
}
