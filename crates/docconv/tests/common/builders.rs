//! In-memory document fixtures.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::{dictionary, Document, Object, Stream};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const PPTX_NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

/// A text run inside a slide; `struck` runs carry `strike="sngStrike"`.
pub struct Run<'a> {
    pub text: &'a str,
    pub struck: bool,
}

pub fn run(text: &str) -> Run<'_> {
    Run { text, struck: false }
}

pub fn struck(text: &str) -> Run<'_> {
    Run { text, struck: true }
}

/// Builds a PPTX where each slide is one paragraph of runs.
pub fn pptx(slides: &[Vec<Run<'_>>]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file("ppt/presentation.xml", options).unwrap();
    writer.write_all(b"<p:presentation/>").unwrap();

    for (i, runs) in slides.iter().enumerate() {
        let body: String = runs
            .iter()
            .map(|r| {
                let props = if r.struck {
                    r#"<a:rPr strike="sngStrike"/>"#
                } else {
                    r#"<a:rPr lang="en-US"/>"#
                };
                format!("<a:r>{}<a:t>{}</a:t></a:r>", props, r.text)
            })
            .collect();
        let xml = format!(
            r#"<p:sld {}><p:cSld><p:spTree><p:sp><p:txBody><a:p>{}</a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
            PPTX_NS, body
        );
        writer
            .start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap()
}

/// Builds a one-sheet XLSX named `Data` from inline-string rows.
pub fn xlsx(rows: &[Vec<String>]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file("xl/workbook.xml", options).unwrap();
    writer
        .write_all(
            br#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        )
        .unwrap();

    writer.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    writer
        .write_all(
            br#"<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
        )
        .unwrap();

    let sheet_data: String = rows
        .iter()
        .enumerate()
        .map(|(r, cells)| {
            let cells: String = cells
                .iter()
                .enumerate()
                .map(|(c, value)| {
                    format!(
                        r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        column_name(c),
                        r + 1,
                        value
                    )
                })
                .collect();
            format!(r#"<row r="{}">{}</row>"#, r + 1, cells)
        })
        .collect();
    writer.start_file("xl/worksheets/sheet1.xml", options).unwrap();
    writer
        .write_all(format!("<worksheet><sheetData>{}</sheetData></worksheet>", sheet_data).as_bytes())
        .unwrap();

    writer.finish().unwrap().into_inner()
}

/// Builds a PDF with one page per line of text, set in Courier.
pub fn pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
