//! In-process PDF page-set operations over the `lopdf` object model.
//!
//! Every operation builds a *new* document by copying page objects (not
//! bytes) from one or more sources, see [`assemble`]. This is the lowest
//! fallback tier for extract/remove/merge and the only implementation of
//! organize, and it also backs the native image and text renderers.
//!
//! All functions here are blocking and CPU-bound; async callers run them
//! inside `tokio::task::spawn_blocking`.

pub mod assemble;
pub mod image;
pub mod text;

use lopdf::{Dictionary, Document, Object, StringFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PageRangeError, PdfOpsError};
use crate::page_range::{PageLayout, PageSet};

pub use assemble::{assemble, CopyReport, PageRef};
pub use image::images_to_pdf;
pub use text::text_to_pdf;

/// Document information written once on an output document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.subject.is_none()
            && self.keywords.is_none()
    }

    /// The `/Info` dictionary for these fields.
    pub fn to_info_dictionary(&self) -> Dictionary {
        let mut info = Dictionary::new();
        let fields = [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                info.set(key, text_string(v));
            }
        }
        info.set("Producer", text_string(concat!("pdfsmith ", env!("CARGO_PKG_VERSION"))));
        info
    }

    /// Read the fields back from a document's `/Info` dictionary.
    pub fn from_document(doc: &Document) -> Self {
        let info = doc
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id));
        let Ok(info) = info else {
            return Self::default();
        };
        let read = |key: &[u8]| -> Option<String> {
            match info.get(key).ok()? {
                Object::String(bytes, _) => Some(decode_text_string(bytes)),
                _ => None,
            }
        };
        Self {
            title: read(b"Title"),
            author: read(b"Author"),
            subject: read(b"Subject"),
            keywords: read(b"Keywords"),
        }
    }
}

/// Encode a PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub(crate) fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Parse a PDF from disk. Encrypted documents are rejected.
pub fn load_document(path: &Path) -> Result<Document, PdfOpsError> {
    let doc = Document::load(path).map_err(|e| PdfOpsError::Load {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if doc.is_encrypted() {
        return Err(PdfOpsError::Encrypted {
            path: path.to_path_buf(),
        });
    }
    debug!("Loaded {} ({} pages)", path.display(), doc.get_pages().len());
    Ok(doc)
}

/// Number of pages of the PDF at `path`.
pub fn page_count(path: &Path) -> Result<u32, PdfOpsError> {
    let doc = Document::load(path).map_err(|e| PdfOpsError::Load {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(doc.get_pages().len() as u32)
}

/// Write `doc` to `path`.
pub fn save_document(doc: &mut Document, path: &Path) -> Result<(), PdfOpsError> {
    doc.save(path).map_err(|e| PdfOpsError::Save {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(())
}

/// Keep only `pages`, in ascending order.
pub fn extract(
    doc: Document,
    pages: &PageSet,
    metadata: Option<&DocumentMetadata>,
) -> Result<(Document, CopyReport), PdfOpsError> {
    if pages.is_empty() {
        return Err(PageRangeError::Empty {
            spec: pages.to_range_string(),
            total: pages.total(),
        }
        .into());
    }
    let picks: Vec<PageRef> = pages.iter().map(|p| PageRef::new(0, p)).collect();
    assemble(vec![doc], &picks, metadata)
}

/// Drop `pages`; implemented as extracting their complement.
pub fn remove(
    doc: Document,
    pages: &PageSet,
    metadata: Option<&DocumentMetadata>,
) -> Result<(Document, CopyReport), PdfOpsError> {
    let keep = pages.complement();
    if keep.is_empty() {
        return Err(PageRangeError::RemovesAllPages {
            spec: pages.to_range_string(),
            total: pages.total(),
        }
        .into());
    }
    extract(doc, &keep, metadata)
}

/// Concatenate every page of every document, in input order.
pub fn merge(
    docs: Vec<Document>,
    metadata: Option<&DocumentMetadata>,
) -> Result<(Document, CopyReport), PdfOpsError> {
    let mut picks = Vec::new();
    for (source, doc) in docs.iter().enumerate() {
        picks.extend(doc.get_pages().keys().map(|&p| PageRef::new(source, p)));
    }
    assemble(docs, &picks, metadata)
}

/// Reorder, duplicate and rotate pages following `layout`.
pub fn organize(
    doc: Document,
    layout: &PageLayout,
    metadata: Option<&DocumentMetadata>,
) -> Result<(Document, CopyReport), PdfOpsError> {
    let picks: Vec<PageRef> = layout
        .placements()
        .iter()
        .map(|p| PageRef::new(0, p.page).rotated(p.rotation))
        .collect();
    assemble(vec![doc], &picks, metadata)
}

/// File-level extract: load, copy `pages`, save.
pub fn extract_file(
    input: &Path,
    pages: &PageSet,
    output: &Path,
    metadata: Option<&DocumentMetadata>,
) -> Result<CopyReport, PdfOpsError> {
    let (mut doc, report) = extract(load_document(input)?, pages, metadata)?;
    save_document(&mut doc, output)?;
    Ok(report)
}

/// File-level merge of `inputs` in order.
pub fn merge_files(
    inputs: &[PathBuf],
    output: &Path,
    metadata: Option<&DocumentMetadata>,
) -> Result<CopyReport, PdfOpsError> {
    let docs = inputs
        .iter()
        .map(|p| load_document(p))
        .collect::<Result<Vec<_>, _>>()?;
    let (mut doc, report) = merge(docs, metadata)?;
    save_document(&mut doc, output)?;
    Ok(report)
}

/// File-level organize.
pub fn organize_file(
    input: &Path,
    layout: &PageLayout,
    output: &Path,
    metadata: Option<&DocumentMetadata>,
) -> Result<CopyReport, PdfOpsError> {
    let (mut doc, report) = organize(load_document(input)?, layout, metadata)?;
    save_document(&mut doc, output)?;
    Ok(report)
}

/// Replace the `/Info` dictionary of the PDF at `path` in place.
pub fn set_metadata_file(path: &Path, metadata: &DocumentMetadata) -> Result<(), PdfOpsError> {
    let mut doc = load_document(path)?;
    let info_id = doc.add_object(metadata.to_info_dictionary());
    doc.trailer.set("Info", info_id);
    doc.prune_objects();
    save_document(&mut doc, path)
}
