//! Hand-rolled content-stream tokenizer that pulls text-showing operators
//! out of raw page content without interpreting fonts.

use std::panic::{catch_unwind, AssertUnwindSafe};

use lopdf::Document;

use crate::error::{panic_message, ExtractError};

use super::quality::{clean_pdf_text, recover_text};
use super::PdfStrategy;

/// `TJ` adjustments at or below this (thousandths of an em) read as a word gap.
const KERNING_SPACE_THRESHOLD: f64 = -250.0;

pub struct ContentStreamStrategy;

impl PdfStrategy for ContentStreamStrategy {
    fn name(&self) -> &'static str {
        "content-stream"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let doc = Document::load_mem(bytes)?;
        let mut out = String::new();

        for (page_num, page_id) in doc.get_pages() {
            let page = catch_unwind(AssertUnwindSafe(|| -> Result<String, ExtractError> {
                let content = doc.get_page_content(page_id)?;
                Ok(extract_page_text(&content))
            }));
            let text = match page {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    log::debug!("content-stream: page {} unreadable: {}", page_num, e);
                    continue;
                }
                Err(payload) => {
                    log::warn!(
                        "content-stream: page {} panicked: {}",
                        page_num,
                        panic_message(payload.as_ref())
                    );
                    continue;
                }
            };

            let text = text.trim();
            if !text.is_empty() {
                out.push_str(&format!("### Page {}\n\n{}\n\n", page_num, text));
            }
        }

        if out.is_empty() {
            return Err(ExtractError::NoText { skipped_pages: 0 });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(Vec<u8>),
    Number(f64),
    Array(Vec<Token>),
    Name,
    Operator(String),
    Other,
}

/// Extracts the text shown by `Tj`, `TJ`, `'` and `"` in a content stream.
pub fn extract_page_text(content: &[u8]) -> String {
    let mut lexer = Lexer::new(content);
    let mut operands: Vec<Token> = Vec::new();
    let mut text = String::new();
    let mut line = String::new();
    let mut last_y: Option<f64> = None;

    while let Some(token) = lexer.next_token() {
        let op = match token {
            Token::Operator(op) => op,
            other => {
                operands.push(other);
                continue;
            }
        };

        match op.as_str() {
            "Tj" => {
                if let Some(Token::Str(s)) = operands.last() {
                    line.push_str(&recover_text(s));
                }
            }
            "'" | "\"" => {
                break_line(&mut text, &mut line);
                if let Some(Token::Str(s)) = operands.last() {
                    line.push_str(&recover_text(s));
                }
            }
            "TJ" => {
                if let Some(Token::Array(items)) = operands.last() {
                    for item in items {
                        match item {
                            Token::Str(s) => line.push_str(&recover_text(s)),
                            Token::Number(n) if *n <= KERNING_SPACE_THRESHOLD => {
                                if !line.ends_with(' ') {
                                    line.push(' ');
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            "Td" | "TD" => {
                let ty = number_at(&operands, 1).unwrap_or(0.0);
                if ty.abs() > f64::EPSILON {
                    break_line(&mut text, &mut line);
                } else if !line.is_empty() && !line.ends_with(' ') {
                    line.push(' ');
                }
            }
            "Tm" => {
                let y = number_at(&operands, 5);
                let same_line = matches!((last_y, y), (Some(a), Some(b)) if (a - b).abs() < 1.0);
                if same_line {
                    if !line.is_empty() && !line.ends_with(' ') {
                        line.push(' ');
                    }
                } else {
                    break_line(&mut text, &mut line);
                }
                last_y = y;
            }
            "T*" | "ET" => break_line(&mut text, &mut line),
            "ID" => lexer.skip_inline_image(),
            _ => {}
        }
        operands.clear();
    }
    break_line(&mut text, &mut line);

    clean_pdf_text(&text)
}

fn number_at(operands: &[Token], index: usize) -> Option<f64> {
    match operands.get(index) {
        Some(Token::Number(n)) => Some(*n),
        _ => None,
    }
}

fn break_line(text: &mut String, line: &mut String) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        text.push_str(trimmed);
        text.push('\n');
    }
    line.clear();
}

struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();
        let b = self.peek()?;
        let token = match b {
            b'(' => {
                self.pos += 1;
                Token::Str(self.literal_string())
            }
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Token::Other
                } else {
                    self.pos += 1;
                    Token::Str(self.hex_string())
                }
            }
            b'>' => {
                self.pos += 1;
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                }
                Token::Other
            }
            b'[' => {
                self.pos += 1;
                Token::Array(self.array())
            }
            b']' | b'{' | b'}' | b')' => {
                self.pos += 1;
                Token::Other
            }
            b'/' => {
                self.pos += 1;
                self.regular_word();
                Token::Name
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => {
                let word = self.regular_word();
                match std::str::from_utf8(word).ok().and_then(|s| s.parse::<f64>().ok()) {
                    Some(n) => Token::Number(n),
                    None => Token::Other,
                }
            }
            _ => {
                let word = self.regular_word();
                if word.is_empty() {
                    self.pos += 1;
                    Token::Other
                } else {
                    Token::Operator(String::from_utf8_lossy(word).into_owned())
                }
            }
        };
        Some(token)
    }

    fn regular_word(&mut self) -> &'a [u8] {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    fn array(&mut self) -> Vec<Token> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                None => break,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => match self.next_token() {
                    Some(token) => items.push(token),
                    None => break,
                },
            }
        }
        items
    }

    /// Reads a `( ... )` string; the opening paren is already consumed.
    fn literal_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1usize;

        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => self.escape(&mut out),
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                _ => out.push(b),
            }
        }
        out
    }

    fn escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else {
            return;
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\\' | b'(' | b')' => out.push(b),
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            // line continuation
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }

    /// Reads a `< ... >` hex string; the opening bracket is already consumed.
    fn hex_string(&mut self) -> Vec<u8> {
        let mut digits = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if let Some(d) = (b as char).to_digit(16) {
                digits.push(d as u8);
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(0);
        }
        digits.chunks_exact(2).map(|p| p[0] << 4 | p[1]).collect()
    }

    /// Skips binary inline image data up to the closing `EI`.
    fn skip_inline_image(&mut self) {
        // one whitespace byte follows ID
        self.pos += 1;
        while self.pos + 1 < self.data.len() {
            let at_ei = self.data[self.pos] == b'E'
                && self.data[self.pos + 1] == b'I'
                && self.pos > 0
                && is_whitespace(self.data[self.pos - 1])
                && self
                    .data
                    .get(self.pos + 2)
                    .is_none_or(|b| is_whitespace(*b) || is_delimiter(*b));
            if at_ei {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
        self.pos = self.data.len();
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0C | 0x00)
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}
