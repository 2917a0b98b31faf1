//! Rebuilds lines and paragraphs from the position of each text run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};

use crate::encoding::is_cjk_char;
use crate::error::{panic_message, ExtractError};

use super::quality::{clean_pdf_text, recover_text};
use super::PdfStrategy;

/// Runs closer than this vertically share a line.
const LINE_TOLERANCE: f64 = 10.0;
/// Horizontal jump past the previous run's end that reads as a word gap.
const WORD_GAP: f64 = 20.0;
/// Estimated advance per character.
const CHAR_WIDTH: f64 = 6.0;
const KERNING_SPACE_THRESHOLD: f64 = -250.0;

pub struct PositionalStrategy;

impl PdfStrategy for PositionalStrategy {
    fn name(&self) -> &'static str {
        "positional"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let doc = Document::load_mem(bytes)?;
        let mut body = String::new();
        let mut skipped = 0usize;

        for (page_num, page_id) in doc.get_pages() {
            let page = catch_unwind(AssertUnwindSafe(|| page_runs(&doc, page_id)));
            let runs = match page {
                Ok(Ok(runs)) => runs,
                Ok(Err(e)) => {
                    log::debug!("positional: page {} skipped: {}", page_num, e);
                    skipped += 1;
                    continue;
                }
                Err(payload) => {
                    log::warn!(
                        "positional: page {} panicked: {}",
                        page_num,
                        panic_message(payload.as_ref())
                    );
                    skipped += 1;
                    continue;
                }
            };

            let paragraphs = paragraphs(&lines(&runs));
            if paragraphs.is_empty() {
                continue;
            }
            body.push_str(&format!("### Page {}\n\n", page_num));
            for paragraph in paragraphs {
                body.push_str(&paragraph);
                body.push_str("\n\n");
            }
        }

        if body.is_empty() {
            return Err(ExtractError::NoText {
                skipped_pages: skipped,
            });
        }
        if skipped > 0 {
            body = format!(
                "> ⚠️ {} page(s) could not be parsed and were skipped.\n\n{}",
                skipped, body
            );
        }
        Ok(body)
    }
}

/// A piece of shown text and where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

fn page_runs(doc: &Document, page_id: lopdf::ObjectId) -> Result<Vec<TextRun>, ExtractError> {
    let content = doc.get_page_content(page_id)?;
    let content = Content::decode(&content)?;
    Ok(collect_runs(&content.operations))
}

#[derive(Default)]
struct TextState {
    line_x: f64,
    line_y: f64,
    x: f64,
    y: f64,
    leading: f64,
}

impl TextState {
    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_x += tx;
        self.line_y += ty;
        self.x = self.line_x;
        self.y = self.line_y;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }
}

/// Walks text operators, tracking the text matrix origin.
pub fn collect_runs(operations: &[Operation]) -> Vec<TextRun> {
    let mut state = TextState::default();
    let mut runs = Vec::new();

    for op in operations {
        let nums = |i: usize| op.operands.get(i).and_then(as_number).unwrap_or(0.0);
        match op.operator.as_str() {
            "BT" => {
                state.line_x = 0.0;
                state.line_y = 0.0;
                state.x = 0.0;
                state.y = 0.0;
            }
            "Td" => state.move_line(nums(0), nums(1)),
            "TD" => {
                state.leading = -nums(1);
                state.move_line(nums(0), nums(1));
            }
            "TL" => state.leading = nums(0),
            "Tm" => {
                state.line_x = nums(4);
                state.line_y = nums(5);
                state.x = state.line_x;
                state.y = state.line_y;
            }
            "T*" => state.next_line(),
            "Tj" => push_run(&mut state, &mut runs, op.operands.first()),
            "'" => {
                state.next_line();
                push_run(&mut state, &mut runs, op.operands.first());
            }
            "\"" => {
                state.next_line();
                push_run(&mut state, &mut runs, op.operands.get(2));
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut text = String::new();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => text.push_str(&recover_text(bytes)),
                            other => {
                                if as_number(other).is_some_and(|n| n <= KERNING_SPACE_THRESHOLD)
                                    && !text.ends_with(' ')
                                {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                    emit(&mut state, &mut runs, text);
                }
            }
            _ => {}
        }
    }
    runs
}

fn push_run(state: &mut TextState, runs: &mut Vec<TextRun>, operand: Option<&Object>) {
    if let Some(Object::String(bytes, _)) = operand {
        emit(state, runs, recover_text(bytes));
    }
}

fn emit(state: &mut TextState, runs: &mut Vec<TextRun>, text: String) {
    let text = clean_pdf_text(&text);
    if text.trim().is_empty() {
        return;
    }
    let advance = text.chars().count() as f64 * CHAR_WIDTH;
    runs.push(TextRun {
        x: state.x,
        y: state.y,
        text,
    });
    state.x += advance;
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Groups runs into lines in content order.
pub fn lines(runs: &[TextRun]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut last: Option<(f64, f64)> = None;

    for run in runs {
        if let Some((last_y, last_end)) = last {
            if (run.y - last_y).abs() > LINE_TOLERANCE {
                if !current.trim().is_empty() {
                    lines.push(current.trim().to_string());
                }
                current.clear();
            } else if run.x - last_end > WORD_GAP && !current.is_empty() {
                current.push(' ');
            }
        }
        current.push_str(&run.text);
        last = Some((run.y, run.x + run.text.chars().count() as f64 * CHAR_WIDTH));
    }
    if !current.trim().is_empty() {
        lines.push(current.trim().to_string());
    }
    lines
}

/// Merges lines into paragraphs, breaking after sentence-ending punctuation.
pub fn paragraphs(lines: &[String]) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(last) = current.chars().last() {
            if matches!(last, '。' | '！' | '？' | '.' | '!' | '?') {
                paragraphs.push(std::mem::take(&mut current));
            } else {
                let joins_cjk = is_cjk_char(last) && line.chars().next().is_some_and(is_cjk_char);
                if !joins_cjk {
                    current.push(' ');
                }
            }
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::pdf::fixtures::build_pdf;

    fn run(x: f64, y: f64, text: &str) -> TextRun {
        TextRun {
            x,
            y,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_lines_cluster_by_y() {
        let runs = vec![
            run(50.0, 700.0, "Invoice"),
            run(150.0, 702.0, "2024"),
            run(50.0, 680.0, "Total"),
            run(80.0, 680.0, "due"),
        ];
        // "Invoice" ends at 92, so 150 is a gap; "Total" ends at 80, so "due" abuts
        assert_eq!(lines(&runs), vec!["Invoice 2024", "Totaldue"]);
    }

    #[test]
    fn test_paragraph_breaks_after_sentence_end() {
        let lines: Vec<String> = ["First line", "continues here.", "Next paragraph"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            paragraphs(&lines),
            vec!["First line continues here.", "Next paragraph"]
        );
    }

    #[test]
    fn test_cjk_lines_join_without_space() {
        let lines = vec!["日本語の".to_string(), "文章です。".to_string(), "次".to_string()];
        assert_eq!(paragraphs(&lines), vec!["日本語の文章です。", "次"]);
    }

    #[test]
    fn test_collect_runs_tracks_matrix() {
        let content = Content::decode(
            b"BT /F1 12 Tf 14 TL 72 700 Td (Header) Tj T* (Second) Tj \
              1 0 0 1 300 500 Tm [(A) -300 (B)] TJ ET",
        )
        .unwrap();
        let runs = collect_runs(&content.operations);
        assert_eq!(
            runs,
            vec![
                run(72.0, 700.0, "Header"),
                run(72.0, 686.0, "Second"),
                run(300.0, 500.0, "A B"),
            ]
        );
    }

    #[test]
    fn test_strategy_renders_pages() {
        let pdf = build_pdf(&[
            "BT /F1 12 Tf 72 700 Td (Hello) Tj 0 -14 Td (world.) Tj 0 -14 Td (Again) Tj ET",
        ]);
        let text = PositionalStrategy.extract(&pdf).unwrap();
        assert_eq!(text, "### Page 1\n\nHello world.\n\nAgain\n\n");
    }

    #[test]
    fn test_strategy_without_text_reports_no_text() {
        let pdf = build_pdf(&["0 0 m 10 10 l S"]);
        assert!(matches!(
            PositionalStrategy.extract(&pdf),
            Err(ExtractError::NoText { skipped_pages: 0 })
        ));
    }

    // `BI` without the required image dictionary entries cannot be decoded
    const BROKEN_INLINE_IMAGE: &str = "BT /F1 12 Tf 72 700 Td (lost) Tj ET BI ID xx EI";

    #[test]
    fn test_unparseable_page_is_reported_and_others_kept() {
        let pdf = build_pdf(&[
            "BT /F1 12 Tf 72 700 Td (Kept page.) Tj ET",
            BROKEN_INLINE_IMAGE,
        ]);
        let text = PositionalStrategy.extract(&pdf).unwrap();
        assert!(text.starts_with("> ⚠️ 1 page(s) could not be parsed and were skipped.\n\n"));
        assert!(text.contains("### Page 1\n\nKept page.\n\n"));
        assert!(!text.contains("### Page 2"));
        assert!(!text.contains("lost"));
    }

    #[test]
    fn test_only_unparseable_pages_counts_skips() {
        let pdf = build_pdf(&[BROKEN_INLINE_IMAGE]);
        assert!(matches!(
            PositionalStrategy.extract(&pdf),
            Err(ExtractError::NoText { skipped_pages: 1 })
        ));
    }
}
