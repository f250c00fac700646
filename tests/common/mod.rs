//! Shared fixtures for the integration tests.
//!
//! Documents are built in memory with lopdf. Page `n` of a labelled
//! document has a MediaBox width of `base + n`, so a page can be traced
//! through extract/merge/organize by its width alone.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

pub fn labelled_document(pages: u32, base: i64) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for n in 1..=pages {
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            format!("BT /F1 12 Tf 20 20 Td (page {n}) Tj ET").into_bytes(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(base + n as i64),
                Object::Integer(300),
            ],
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Write a labelled document to `dir/name` and return its path.
pub fn write_pdf(dir: &Path, name: &str, pages: u32, base: i64) -> PathBuf {
    let path = dir.join(name);
    labelled_document(pages, base)
        .save(&path)
        .expect("save fixture");
    path
}

pub fn page_widths(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).expect("load output");
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_dictionary(id).expect("page");
            let mediabox = page
                .get(b"MediaBox")
                .and_then(Object::as_array)
                .expect("mediabox");
            mediabox[2].as_i64().expect("integer width")
        })
        .collect()
}

pub fn page_rotations(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).expect("load output");
    doc.get_pages()
        .values()
        .map(|&id| {
            doc.get_dictionary(id)
                .ok()
                .and_then(|d| d.get(b"Rotate").ok())
                .and_then(|r| r.as_i64().ok())
                .unwrap_or(0)
        })
        .collect()
}

/// `/Title` of the document information dictionary, if any.
pub fn info_title(path: &Path) -> Option<String> {
    let doc = Document::load(path).ok()?;
    let info = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(d) => d,
        _ => return None,
    };
    let title = info.get(b"Title").ok()?.as_str().ok()?;
    Some(String::from_utf8_lossy(title).into_owned())
}
