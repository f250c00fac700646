//! Plain text to PDF using the built-in Courier font on A4 pages.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, StringFormat};

use super::DocumentMetadata;
use crate::error::PdfOpsError;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 12;
/// Courier advances 0.6 em per glyph.
const CHARS_PER_LINE: usize = ((PAGE_WIDTH - 2 * MARGIN) * 10 / (FONT_SIZE * 6)) as usize;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
const TAB_WIDTH: usize = 4;

/// Render `text` as a paginated monospaced document.
///
/// Long lines are hard-wrapped, tabs expanded, and characters outside
/// Latin-1 replaced by `?`. Empty input yields a single blank page.
pub fn text_to_pdf(text: &str, metadata: Option<&DocumentMetadata>) -> Result<Document, PdfOpsError> {
    let lines = layout_lines(text);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![lines.as_slice()]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    for chunk in chunks {
        let content_id = doc.add_object(lopdf::Stream::new(dictionary! {}, page_content(chunk)?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
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
    if let Some(meta) = metadata.filter(|m| !m.is_empty()) {
        let info_id = doc.add_object(meta.to_info_dictionary());
        doc.trailer.set("Info", info_id);
    }
    doc.compress();
    Ok(doc)
}

fn page_content(lines: &[String]) -> Result<Vec<u8>, PdfOpsError> {
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Integer(FONT_SIZE)]),
        Operation::new("TL", vec![Object::Integer(LEADING)]),
        Operation::new(
            "Td",
            vec![
                Object::Integer(MARGIN),
                Object::Integer(PAGE_HEIGHT - MARGIN - FONT_SIZE),
            ],
        ),
    ];
    for line in lines {
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(latin1(line), StringFormat::Literal)],
        ));
        ops.push(Operation::new("T*", vec![]));
    }
    ops.push(Operation::new("ET", vec![]));
    Ok(Content { operations: ops }.encode()?)
}

/// Split into display lines: expand tabs, strip CR, wrap at the line width.
fn layout_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let mut line = String::with_capacity(raw.len());
        for ch in raw.chars() {
            match ch {
                '\t' => {
                    let pad = TAB_WIDTH - line.chars().count() % TAB_WIDTH;
                    line.extend(std::iter::repeat(' ').take(pad));
                }
                '\r' => {}
                c => line.push(c),
            }
        }
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            out.push(String::new());
            continue;
        }
        for piece in chars.chunks(CHARS_PER_LINE) {
            out.push(piece.iter().collect());
        }
    }
    // A trailing newline should not produce a trailing blank page.
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}

fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| {
            let code = c as u32;
            if code < 0x20 {
                b' '
            } else if code <= 0xFF {
                code as u8
            } else {
                b'?'
            }
        })
        .collect()
}
