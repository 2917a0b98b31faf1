//! Markdown templates wrapping extracted content with document metadata.

use base64::Engine;
use chrono::{DateTime, Local, Utc};

const FOOTER: &str = "---\n*Generated by automatic document conversion*\n";

/// Metadata printed in every template header.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub converted_at: DateTime<Utc>,
}

impl DocumentInfo {
    fn timestamp(&self) -> String {
        self.converted_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// What an extractor produced for a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Recovered text rendered under the success template.
    Document { kind: String, body: String },
    /// Plain text shown verbatim inside a fenced code block.
    PlainText { text: String },
    /// Pre-rendered Markdown sections (spreadsheet tables).
    Sections { kind: String, sections: String },
    /// Whole file embedded as a data URI.
    Image { mime_type: String, bytes: Vec<u8> },
    /// Nothing usable; rendered with the error template.
    Failed { reason: String },
}

impl Extraction {
    pub fn document(kind: impl Into<String>, body: impl Into<String>) -> Self {
        Extraction::Document {
            kind: kind.into(),
            body: body.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Extraction::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Extraction::Failed { .. })
    }
}

/// Renders an extraction into the matching template.
pub fn assemble(info: &DocumentInfo, extraction: &Extraction) -> String {
    match extraction {
        Extraction::Document { kind, body } => render_success(info, kind, body),
        Extraction::PlainText { text } => {
            render_success(info, "Plain text", &fenced_code_block(text))
        }
        Extraction::Sections { kind, sections } => render_success(info, kind, sections),
        Extraction::Image { mime_type, bytes } => render_image(info, mime_type, bytes),
        Extraction::Failed { reason } => render_error(info, reason),
    }
}

fn write_header(out: &mut String, info: &DocumentInfo, kind: Option<&str>) {
    out.push_str(&format!("# {}\n\n", info.filename));
    out.push_str("## Document Info\n\n");
    out.push_str(&format!("- **File name**: {}\n", info.filename));
    out.push_str(&format!("- **File size**: {} bytes\n", info.size));
    out.push_str(&format!("- **MIME type**: {}\n", info.mime_type));
    if let Some(kind) = kind {
        out.push_str(&format!("- **Document type**: {}\n", kind));
    }
    out.push_str(&format!("- **Converted at**: {}\n\n", info.timestamp()));
}

fn render_success(info: &DocumentInfo, kind: &str, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 256);
    write_header(&mut out, info, Some(kind));
    out.push_str("## Content\n\n");
    out.push_str(body.trim_end());
    out.push_str("\n\n");
    out.push_str(FOOTER);
    out
}

fn render_error(info: &DocumentInfo, reason: &str) -> String {
    let mut out = String::new();
    write_header(&mut out, info, None);
    out.push_str("## Conversion Notice\n\n");
    out.push_str(&format!("⚠️ {}\n\n", reason));
    out.push_str(FOOTER);
    out
}

fn render_image(info: &DocumentInfo, mime_type: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + 256);
    write_header(&mut out, info, Some("Image"));
    out.push_str("## Image Preview\n\n");
    out.push_str(&format!(
        "![{}](data:{};base64,{})\n\n",
        info.filename, mime_type, encoded
    ));
    out.push_str(FOOTER);
    out
}

/// Wraps text in a backtick fence longer than any backtick run inside it.
pub fn fenced_code_block(text: &str) -> String {
    let longest_run = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest_run + 1).max(3));
    let mut out = String::with_capacity(text.len() + fence.len() * 2 + 2);
    out.push_str(&fence);
    out.push('\n');
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&fence);
    out
}

/// Renders a grid as a Markdown table. The first row is the header; rows
/// beyond `max_rows` (header included) and columns beyond `max_columns`
/// are omitted.
pub fn render_table(rows: &[Vec<String>], max_columns: usize, max_rows: usize) -> String {
    let rows = &rows[..rows.len().min(max_rows)];
    let width = rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .min(max_columns);
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push('|');
        for col in 0..width {
            let cell = row.get(col).map(String::as_str).unwrap_or("");
            out.push(' ');
            out.push_str(&escape_cell(cell));
            out.push_str(" |");
        }
        out.push('\n');

        if i == 0 {
            out.push('|');
            for _ in 0..width {
                out.push_str(" --- |");
            }
            out.push('\n');
        }
    }
    out
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
