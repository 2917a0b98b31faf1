//! Helpers for sanitizing file names, both for span attributes and for the
//! names of converted files.

use std::path::Path;

/// Characters that are not allowed in generated file names.
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Replaces path separators and other reserved characters with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Name of the Markdown output for `original_filename`, as
/// `{stem}_converted_{unix_secs}.md`.
pub fn converted_filename(original_filename: &str, unix_secs: i64) -> String {
    let stem = match original_filename.rfind('.') {
        Some(pos) if pos > 0 => &original_filename[..pos],
        _ => original_filename,
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{}_converted_{}.md", sanitize_filename(stem), unix_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/Documents/invoice.pdf")),
            "invoice.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_sanitize_filename_replaces_reserved() {
        assert_eq!(sanitize_filename(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("報告 2024"), "報告 2024");
    }

    #[test]
    fn test_converted_filename() {
        assert_eq!(
            converted_filename("Q3 report.pdf", 1_700_000_000),
            "Q3 report_converted_1700000000.md"
        );
        assert_eq!(
            converted_filename("archive.tar.gz", 5),
            "archive.tar_converted_5.md"
        );
        assert_eq!(converted_filename("README", 5), "README_converted_5.md");
        assert_eq!(converted_filename(".env", 5), ".env_converted_5.md");
        assert_eq!(converted_filename("", 5), "document_converted_5.md");
        assert_eq!(
            converted_filename("../etc/x.txt", 5),
            ".._etc_x_converted_5.md"
        );
    }
}
