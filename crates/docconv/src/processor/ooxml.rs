//! Helpers shared by the Office Open XML readers.

use std::io::{Cursor, Read};

use quick_xml::events::{BytesRef, BytesStart, BytesText};
use zip::ZipArchive;

use crate::error::ExtractError;

/// Compound File Binary signature used by legacy .doc/.xls/.ppt files.
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

pub fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    Ok(ZipArchive::new(Cursor::new(bytes))?)
}

pub fn is_legacy_container(bytes: &[u8]) -> bool {
    bytes.starts_with(&OLE_MAGIC)
}

/// Reads an archive member as UTF-8 text. A missing member is `Ok(None)`.
pub fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Option<String>, ExtractError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Value of the attribute whose local name is `key`, ignoring prefixes.
pub fn attr(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| unescape_lossy(&String::from_utf8_lossy(&a.value)))
}

pub fn text_content(text: &BytesText<'_>) -> String {
    unescape_lossy(&String::from_utf8_lossy(text))
}

/// Resolves `&name;` or `&#NN;` references reported as separate events.
pub fn resolve_reference(reference: &BytesRef<'_>) -> String {
    let name = String::from_utf8_lossy(reference);
    unescape_lossy(&format!("&{};", name))
}

fn unescape_lossy(raw: &str) -> String {
    match quick_xml::escape::unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// OOXML boolean toggles: absent `val` means on.
pub fn toggle_enabled(element: &BytesStart<'_>) -> bool {
    match attr(element, b"val") {
        Some(v) => !matches!(v.trim(), "false" | "0" | "off" | "none"),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;
    use quick_xml::Reader;

    fn first_start(xml: &str) -> BytesStart<'static> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) => return e.into_owned(),
                Event::Eof => panic!("no element"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_attr_ignores_prefix_and_unescapes() {
        let e = first_start(r#"<sheet name="P&amp;L" r:id="rId3"/>"#);
        assert_eq!(attr(&e, b"name").as_deref(), Some("P&L"));
        assert_eq!(attr(&e, b"id").as_deref(), Some("rId3"));
        assert_eq!(attr(&e, b"missing"), None);
    }

    #[test]
    fn test_toggle_enabled() {
        assert!(toggle_enabled(&first_start("<w:strike/>")));
        assert!(toggle_enabled(&first_start(r#"<w:strike w:val="true"/>"#)));
        assert!(!toggle_enabled(&first_start(r#"<w:strike w:val="false"/>"#)));
        assert!(!toggle_enabled(&first_start(r#"<w:strike w:val="0"/>"#)));
    }

    #[test]
    fn test_legacy_container_detection() {
        assert!(is_legacy_container(&[
            0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0x00
        ]));
        assert!(!is_legacy_container(b"PK\x03\x04"));
    }

    #[test]
    fn test_open_archive_rejects_garbage() {
        assert!(matches!(
            open_archive(b"not a zip"),
            Err(ExtractError::Archive(_))
        ));
    }
}
