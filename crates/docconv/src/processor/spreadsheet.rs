//! CSV, XLSX and legacy XLS readers rendering grids as Markdown tables.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::config::TableConfig;
use crate::encoding;
use crate::error::ExtractError;
use crate::format::{self, DocumentFamily};
use crate::markdown::{self, Extraction};
use crate::processor::{binary, ooxml, DocumentProcessor, SourceDocument};

const KIND_XLSX: &str = "Excel spreadsheet (XLSX)";
const KIND_XLS: &str = "Excel spreadsheet (XLS, reduced fidelity)";
const KIND_CSV: &str = "CSV file";
const LEGACY_UNSUPPORTED: &str =
    "The legacy XLS format is not fully supported; please convert it to XLSX and upload again.";

static WORKSHEET_MEMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").unwrap());

pub struct SpreadsheetProcessor {
    limits: TableConfig,
}

impl SpreadsheetProcessor {
    pub fn new(limits: TableConfig) -> Self {
        Self { limits }
    }
}

impl Default for SpreadsheetProcessor {
    fn default() -> Self {
        Self::new(TableConfig::default())
    }
}

impl DocumentProcessor for SpreadsheetProcessor {
    fn process(&self, source: &SourceDocument, bytes: &[u8]) -> Extraction {
        let ext = format::extension_of(&source.filename);
        let mime = format::normalize_mime(&source.mime_type);

        if ext == "csv" || mime == format::MIME_CSV {
            return self.render_csv(bytes);
        }
        if ext == "xls" || ooxml::is_legacy_container(bytes) {
            return extract_legacy(bytes);
        }

        match read_workbook(bytes, &self.limits) {
            Ok(sheets) if sheets.is_empty() => Extraction::document(
                KIND_XLSX,
                "(The workbook contains no worksheets.)",
            ),
            Ok(sheets) => Extraction::Sections {
                kind: KIND_XLSX.to_string(),
                sections: self.render_sheets(&sheets),
            },
            Err(e) => {
                log::warn!("XLSX extraction failed for {}: {}", source.filename, e);
                Extraction::failed(format!("Excel conversion failed: {}", e))
            }
        }
    }

    fn supports(&self, family: DocumentFamily) -> bool {
        matches!(family, DocumentFamily::Excel)
    }
}

impl SpreadsheetProcessor {
    fn render_csv(&self, bytes: &[u8]) -> Extraction {
        let text = encoding::to_unicode_text(bytes);
        let rows: Vec<Vec<String>> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.split(',').map(|c| c.trim().to_string()).collect())
            .collect();

        let body = if rows.is_empty() {
            "(empty file)".to_string()
        } else {
            markdown::render_table(&rows, self.limits.max_columns, self.limits.max_rows)
        };

        Extraction::Sections {
            kind: KIND_CSV.to_string(),
            sections: format!("## Table Content\n\n{}", body),
        }
    }

    fn render_sheets(&self, sheets: &[Sheet]) -> String {
        let mut out = String::new();
        for sheet in sheets {
            out.push_str(&format!("## Sheet: {}\n\n", sheet.name));
            if sheet.rows.iter().all(|r| r.iter().all(String::is_empty)) {
                out.push_str("(empty sheet)\n\n");
            } else {
                out.push_str(&markdown::render_table(
                    &sheet.rows,
                    self.limits.max_columns,
                    self.limits.max_rows,
                ));
                out.push('\n');
            }
        }
        out
    }
}

fn extract_legacy(bytes: &[u8]) -> Extraction {
    let text = binary::scan_printable_text(bytes);
    if text.is_empty() {
        Extraction::failed(LEGACY_UNSUPPORTED)
    } else {
        Extraction::document(KIND_XLS, text)
    }
}

/// A worksheet read into a row-major grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Reads every worksheet of an XLSX package in workbook order. Cells outside
/// the table limits are not collected.
pub fn read_workbook(bytes: &[u8], limits: &TableConfig) -> Result<Vec<Sheet>, ExtractError> {
    let mut archive = ooxml::open_archive(bytes)?;

    let shared_strings = match ooxml::read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let struck_styles = match ooxml::read_entry(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_struck_styles(&xml)?,
        None => Vec::new(),
    };

    let mut sheets = Vec::new();
    for (name, path) in sheet_locations(&mut archive)? {
        let Some(xml) = ooxml::read_entry(&mut archive, &path)? else {
            log::warn!("Worksheet '{}' missing at {}", name, path);
            continue;
        };
        let grid = SheetGrid {
            shared_strings: &shared_strings,
            struck_styles: &struck_styles,
            limits,
        };
        sheets.push(Sheet {
            name,
            rows: grid.parse(&xml)?,
        });
    }
    Ok(sheets)
}

/// Sheet names and member paths, in workbook order.
fn sheet_locations(archive: &mut ooxml::Archive<'_>) -> Result<Vec<(String, String)>, ExtractError> {
    let declared = match ooxml::read_entry(archive, "xl/workbook.xml")? {
        Some(xml) => parse_workbook_sheets(&xml)?,
        None => Vec::new(),
    };
    let rels = match ooxml::read_entry(archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let resolved: Vec<(String, String)> = declared
        .into_iter()
        .filter_map(|(name, rid)| {
            rels.get(&rid)
                .map(|target| (name, resolve_target(target)))
        })
        .collect();
    if !resolved.is_empty() {
        return Ok(resolved);
    }

    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|member| {
            WORKSHEET_MEMBER
                .captures(member)
                .and_then(|c| c[1].parse::<u32>().ok())
                .map(|n| (n, member.to_string()))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered
        .into_iter()
        .map(|(n, path)| (format!("Sheet{}", n), path))
        .collect())
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn parse_workbook_sheets(xml: &str) -> Result<Vec<(String, String)>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(rid)) = (ooxml::attr(&e, b"name"), ooxml::attr(&e, b"id"))
                {
                    sheets.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (ooxml::attr(&e, b"Id"), ooxml::attr(&e, b"Target"))
                {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// One entry per `<si>`; phonetic runs (`rPh`) are skipped.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"rPh" => in_phonetic = true,
                b"t" if in_item && !in_phonetic => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&ooxml::text_content(&t)),
            Event::GeneralRef(r) if in_text => current.push_str(&ooxml::resolve_reference(&r)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// For each `cellXfs` entry, whether its font is struck through.
fn parse_struck_styles(xml: &str) -> Result<Vec<bool>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut fonts: Vec<bool> = Vec::new();
    let mut xf_fonts: Vec<usize> = Vec::new();
    let mut in_fonts = false;
    let mut in_font = false;
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"fonts" => in_fonts = true,
                b"font" if in_fonts => {
                    in_font = true;
                    fonts.push(false);
                }
                b"strike" if in_font => set_last(&mut fonts, ooxml::toggle_enabled(&e)),
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => xf_fonts.push(font_id(&e)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"font" if in_fonts => fonts.push(false),
                b"strike" if in_font => set_last(&mut fonts, ooxml::toggle_enabled(&e)),
                b"xf" if in_cell_xfs => xf_fonts.push(font_id(&e)),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"fonts" => in_fonts = false,
                b"font" => in_font = false,
                b"cellXfs" => in_cell_xfs = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(xf_fonts
        .into_iter()
        .map(|id| fonts.get(id).copied().unwrap_or(false))
        .collect())
}

fn set_last(flags: &mut [bool], value: bool) {
    if let Some(last) = flags.last_mut() {
        *last = value;
    }
}

fn font_id(e: &BytesStart<'_>) -> usize {
    ooxml::attr(e, b"fontId")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Splits an `A1` style reference into zero-based (column, row).
fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits = &reference[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return None;
    }

    let mut col = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col - 1, row - 1))
}

struct SheetGrid<'a> {
    shared_strings: &'a [String],
    struck_styles: &'a [bool],
    limits: &'a TableConfig,
}

#[derive(Default)]
struct CellState {
    col: usize,
    kind: Option<String>,
    struck: bool,
    value: String,
    inline: String,
}

impl SheetGrid<'_> {
    fn parse(&self, xml: &str) -> Result<Vec<Vec<String>>, ExtractError> {
        let mut reader = Reader::from_str(xml);
        let mut rows: Vec<Vec<String>> = Vec::new();

        let mut row_idx = 0usize;
        let mut next_row = 0usize;
        let mut next_col = 0usize;
        let mut cell: Option<CellState> = None;
        let mut in_value = false;
        let mut in_inline_text = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"row" => {
                        row_idx = row_number(&e).unwrap_or(next_row);
                        next_row = row_idx + 1;
                        next_col = 0;
                    }
                    b"c" => {
                        cell = Some(self.start_cell(&e, next_col));
                    }
                    b"v" if cell.is_some() => in_value = true,
                    b"t" if cell.is_some() => in_inline_text = true,
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"row" => {
                        row_idx = row_number(&e).unwrap_or(next_row);
                        next_row = row_idx + 1;
                    }
                    b"c" => {
                        let state = self.start_cell(&e, next_col);
                        next_col = state.col + 1;
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" => in_value = false,
                    b"t" => in_inline_text = false,
                    b"c" => {
                        if let Some(state) = cell.take() {
                            next_col = state.col + 1;
                            let value = self.cell_value(&state);
                            self.place(&mut rows, row_idx, state.col, value);
                        }
                    }
                    _ => {}
                },
                Event::Text(t) => {
                    if let Some(state) = cell.as_mut() {
                        if in_value {
                            state.value.push_str(&ooxml::text_content(&t));
                        } else if in_inline_text {
                            state.inline.push_str(&ooxml::text_content(&t));
                        }
                    }
                }
                Event::GeneralRef(r) => {
                    if let Some(state) = cell.as_mut() {
                        if in_value {
                            state.value.push_str(&ooxml::resolve_reference(&r));
                        } else if in_inline_text {
                            state.inline.push_str(&ooxml::resolve_reference(&r));
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        for row in rows.iter_mut() {
            while row.last().is_some_and(String::is_empty) {
                row.pop();
            }
        }
        while rows.last().is_some_and(Vec::is_empty) {
            rows.pop();
        }
        Ok(rows)
    }

    fn start_cell(&self, e: &BytesStart<'_>, next_col: usize) -> CellState {
        let col = ooxml::attr(e, b"r")
            .and_then(|r| parse_cell_ref(&r))
            .map(|(col, _)| col)
            .unwrap_or(next_col);
        let struck = ooxml::attr(e, b"s")
            .and_then(|s| s.parse::<usize>().ok())
            .and_then(|s| self.struck_styles.get(s).copied())
            .unwrap_or(false);
        CellState {
            col,
            kind: ooxml::attr(e, b"t"),
            struck,
            ..CellState::default()
        }
    }

    fn cell_value(&self, state: &CellState) -> String {
        if state.struck {
            return String::new();
        }
        match state.kind.as_deref() {
            Some("s") => state
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| self.shared_strings.get(i).cloned())
                .unwrap_or_default(),
            Some("inlineStr") => state.inline.clone(),
            Some("b") => match state.value.trim() {
                "1" => "TRUE".to_string(),
                _ => "FALSE".to_string(),
            },
            _ => state.value.clone(),
        }
    }

    fn place(&self, rows: &mut Vec<Vec<String>>, row: usize, col: usize, value: String) {
        if row >= self.limits.max_rows || col >= self.limits.max_columns {
            return;
        }
        if rows.len() <= row {
            rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value;
    }
}

fn row_number(e: &BytesStart<'_>) -> Option<usize> {
    ooxml::attr(e, b"r")
        .and_then(|r| r.parse::<usize>().ok())
        .filter(|r| *r > 0)
        .map(|r| r - 1)
}
