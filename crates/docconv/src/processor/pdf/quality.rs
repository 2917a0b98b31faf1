//! Text-quality scoring and cleanup for PDF extraction output.

use crate::encoding;

/// Pages scoring at or below this ratio are treated as noise.
pub const MIN_PAGE_QUALITY: f64 = 0.5;

/// Dropped runs shorter than this collapse to a single space.
const MAX_GAP_AS_SPACE: usize = 5;

/// Cleaned text shorter than this share of the input triggers CJK recovery.
const MIN_KEPT_RATIO: f64 = 0.3;

/// Marker lopdf emits for fonts it cannot map to Unicode.
const IDENTITY_H_MARKER: &str = "?Identity-H Unimplemented?";

/// Fraction of characters that belong to the expected-script allow-set.
pub fn quality_score(text: &str) -> f64 {
    let mut total = 0usize;
    let mut good = 0usize;
    for c in text.chars() {
        total += 1;
        if is_expected_char(c) {
            good += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    good as f64 / total as f64
}

pub fn passes_quality(text: &str) -> bool {
    quality_score(text) > MIN_PAGE_QUALITY
}

fn is_expected_char(c: char) -> bool {
    matches!(
        c,
        '\u{20}'..='\u{7E}'
            | '\n'
            | '\r'
            | '\t'
            | '\u{3000}'..='\u{303F}'
            | '\u{3040}'..='\u{30FF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{FF00}'..='\u{FFEF}'
            | '\u{AC00}'..='\u{D7AF}'
    )
}

fn is_garbage_char(c: char) -> bool {
    c == '\u{FFFD}'
        || ('\u{E000}'..='\u{F8FF}').contains(&c)
        || (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        || c >= '\u{100000}'
}

/// Drops replacement characters, private-use glyphs and control characters.
/// A short run of dropped characters between kept text becomes one space.
pub fn clean_pdf_text(text: &str) -> String {
    let text = text.replace(IDENTITY_H_MARKER, "");
    let mut out = String::with_capacity(text.len());
    let mut dropped = 0usize;

    for c in text.chars() {
        if is_garbage_char(c) {
            dropped += 1;
            continue;
        }
        if dropped > 0 {
            if dropped < MAX_GAP_AS_SPACE && !out.is_empty() && !out.ends_with(char::is_whitespace)
                && !c.is_whitespace()
            {
                out.push(' ');
            }
            dropped = 0;
        }
        out.push(c);
    }
    out
}

/// Decodes the raw bytes of a PDF string operand.
///
/// Tries UTF-16BE (BOM or zero-high-byte pattern), UTF-8, plausible CJK
/// legacy encodings, and finally a byte-to-char (Latin-1) mapping.
pub fn decode_pdf_string(raw: &[u8]) -> String {
    if let Some(rest) = raw.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16be(rest);
    }
    if looks_like_utf16be(raw) {
        return decode_utf16be(raw);
    }
    if let Ok(text) = std::str::from_utf8(raw) {
        return text.to_string();
    }
    if let Some(text) = encoding::decode_cjk_candidate(raw) {
        return text;
    }
    raw.iter().map(|&b| b as char).collect()
}

/// Decodes and cleans raw bytes, retrying as CJK when cleanup removed most
/// of the text.
pub fn recover_text(raw: &[u8]) -> String {
    let decoded = decode_pdf_string(raw);
    let cleaned = clean_pdf_text(&decoded);

    let original_len = decoded.chars().count();
    let kept_len = cleaned.chars().count();
    let too_short =
        kept_len < 2 || (original_len > 0 && (kept_len as f64) < original_len as f64 * MIN_KEPT_RATIO);
    if too_short && !raw.is_empty() {
        if let Some(cjk) = encoding::decode_cjk_candidate(raw) {
            return clean_pdf_text(&cjk);
        }
    }
    cleaned
}

fn looks_like_utf16be(raw: &[u8]) -> bool {
    if raw.len() < 4 || raw.len() % 2 != 0 {
        return false;
    }
    let pairs = raw.len() / 2;
    let zero_high = raw.chunks_exact(2).filter(|p| p[0] == 0 && p[1] != 0).count();
    zero_high * 2 > pairs
}

fn decode_utf16be(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|p| u16::from_be_bytes([p[0], p[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_of_clean_text() {
        assert_eq!(quality_score("Hello world"), 1.0);
        assert_eq!(quality_score("中文テキスト 한국어"), 1.0);
        assert_eq!(quality_score(""), 0.0);
    }

    #[test]
    fn test_quality_of_garbled_text() {
        let garbled = "\u{E001}\u{E002}\u{E003}ab";
        assert!((quality_score(garbled) - 0.4).abs() < 1e-9);
        assert!(!passes_quality(garbled));
    }

    #[test]
    fn test_quality_threshold_is_exclusive() {
        // exactly half the characters are expected
        let half = "ab\u{0400}\u{0401}";
        assert_eq!(quality_score(half), 0.5);
        assert!(!passes_quality(half));
        assert!(passes_quality("abc\u{0400}"));
    }

    #[test]
    fn test_clean_drops_garbage_and_bridges_gaps() {
        assert_eq!(clean_pdf_text("foo\u{FFFD}bar"), "foo bar");
        assert_eq!(clean_pdf_text("a\u{E000}\u{E001}\u{E002}\u{E003}\u{E004}b"), "ab");
        assert_eq!(clean_pdf_text("x\u{0001}\ny"), "x\ny");
        assert_eq!(clean_pdf_text("?Identity-H Unimplemented?text"), "text");
    }

    #[test]
    fn test_decode_pdf_string_variants() {
        assert_eq!(decode_pdf_string(b"plain"), "plain");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x4E, 0x2D]), "A中");
        assert_eq!(decode_pdf_string(&[0x00, 0x48, 0x00, 0x69]), "Hi");
        assert_eq!(decode_pdf_string(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_recover_text_prefers_cjk_when_cleanup_empties() {
        // "日本語" in Shift_JIS
        let sjis = [0x93, 0xFA, 0x96, 0x7B, 0x8C, 0xEA];
        assert_eq!(recover_text(&sjis), "日本語");
        assert_eq!(recover_text(b"Total: 42"), "Total: 42");
    }
}
