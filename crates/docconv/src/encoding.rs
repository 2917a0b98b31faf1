//! Byte buffer to Unicode text conversion with CJK legacy-encoding detection.
//!
//! `to_unicode_text` never fails: when no candidate encoding decodes the
//! input cleanly it falls back to a lossy UTF-8 decode.

use encoding_rs::{
    Encoding, BIG5, EUC_JP, GB18030, GBK, ISO_2022_JP, SHIFT_JIS, UTF_16BE, UTF_16LE,
};

const BOM: char = '\u{feff}';

/// Legacy encodings tried, in order, when the input is not UTF-8.
const LEGACY_CANDIDATES: &[&Encoding] = &[GBK, GB18030, BIG5, SHIFT_JIS, EUC_JP, ISO_2022_JP];

/// Encodings tried when recovering CJK text from a garbled extraction.
const CJK_RECOVERY_CANDIDATES: &[&Encoding] = &[SHIFT_JIS, EUC_JP, GBK, BIG5];

/// Share of CJK characters above which text is considered plausibly CJK.
const CJK_PLAUSIBILITY_RATIO: f64 = 0.1;

/// Decodes an arbitrary byte buffer into a `String`.
///
/// Order: UTF-8, UTF-16 with BOM, legacy CJK encodings (first clean decode
/// wins), lossy UTF-8.
pub fn to_unicode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return strip_bom(text).to_string();
    }

    if let Some(text) = decode_utf16_with_bom(bytes) {
        return text;
    }

    for encoding in LEGACY_CANDIDATES {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            log::debug!("Decoded {} bytes as {}", bytes.len(), encoding.name());
            return strip_bom(&text).to_string();
        }
    }

    log::debug!(
        "No clean decoding for {} bytes, falling back to lossy UTF-8",
        bytes.len()
    );
    strip_bom(&String::from_utf8_lossy(bytes)).to_string()
}

fn strip_bom(text: &str) -> &str {
    text.trim_start_matches(BOM)
}

fn decode_utf16_with_bom(bytes: &[u8]) -> Option<String> {
    let encoding = match bytes {
        [0xFF, 0xFE, ..] => UTF_16LE,
        [0xFE, 0xFF, ..] => UTF_16BE,
        _ => return None,
    };
    let (text, _had_errors) = encoding.decode_with_bom_removal(bytes);
    Some(strip_bom(&text).to_string())
}

/// Returns true when more than 10% of the characters are CJK ideographs or
/// Japanese kana.
pub fn contains_plausible_cjk(text: &str) -> bool {
    let mut total = 0usize;
    let mut cjk = 0usize;
    for c in text.chars() {
        total += 1;
        if is_cjk_char(c) {
            cjk += 1;
        }
    }
    total > 0 && (cjk as f64 / total as f64) > CJK_PLAUSIBILITY_RATIO
}

pub fn is_cjk_char(c: char) -> bool {
    matches!(
        c,
        '\u{4E00}'..='\u{9FFF}'
            | '\u{3040}'..='\u{309F}'
            | '\u{30A0}'..='\u{30FF}'
            | '\u{3400}'..='\u{4DBF}'
    )
}

/// Tries the CJK recovery encodings and returns the first clean decoding
/// that looks like CJK text.
pub fn decode_cjk_candidate(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    CJK_RECOVERY_CANDIDATES.iter().find_map(|encoding| {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .filter(|text| contains_plausible_cjk(text))
    })
}
