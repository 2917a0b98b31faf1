//! Printable-byte scan used for legacy binary Office containers.
//!
//! Fidelity is low: the scan keeps runs of printable bytes and discards
//! everything else, so formatting and most structure is lost.

use crate::encoding;

/// Minimum run length (in bytes) kept from the raw stream.
const MIN_WORD_LEN: usize = 2;

pub fn scan_printable_text(data: &[u8]) -> String {
    let mut kept: Vec<u8> = Vec::with_capacity(data.len() / 2);
    let mut word: Vec<u8> = Vec::new();

    for &b in data {
        if is_text_byte(b) {
            word.push(b);
        } else {
            if word.len() >= MIN_WORD_LEN {
                kept.extend_from_slice(&word);
                kept.push(b' ');
            }
            word.clear();
        }
    }
    if word.len() >= MIN_WORD_LEN {
        kept.extend_from_slice(&word);
    }

    let text = match String::from_utf8(kept) {
        Ok(text) => text,
        Err(e) => {
            let bytes = e.into_bytes();
            encoding::decode_cjk_candidate(&bytes)
                .unwrap_or_else(|| encoding::to_unicode_text(&bytes))
        }
    };

    collapse_whitespace(&text)
}

fn is_text_byte(b: u8) -> bool {
    (0x20..=0x7E).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t' || b >= 0x80
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() || c == '\u{FFFD}' {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}
