//! Page-copy assembler: builds a fresh document from pages picked out of
//! one or more source documents.
//!
//! Sources are renumbered into one object space and their objects moved
//! into the destination. Each pick clones the source page dictionary,
//! pulls down the attributes it inherits from the page tree, and hangs it
//! under the new `/Pages` node. Unreachable objects (old catalogs, page
//! trees, unpicked pages) are pruned before the document is returned.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::DocumentMetadata;
use crate::error::PdfOpsError;
use crate::page_range::normalize_rotation;

/// Page attributes a page may inherit from an ancestor `/Pages` node.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// US Letter, used when neither the page nor its ancestors carry a MediaBox.
const DEFAULT_MEDIABOX: [i64; 4] = [0, 0, 612, 792];

const MAX_TREE_DEPTH: usize = 64;

/// One page to copy: 1-based `page` of source document `source`, with an
/// extra clockwise `rotation` in degrees added to the page's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRef {
    pub source: usize,
    pub page: u32,
    pub rotation: i64,
}

impl PageRef {
    pub fn new(source: usize, page: u32) -> Self {
        Self {
            source,
            page,
            rotation: 0,
        }
    }

    pub fn rotated(mut self, degrees: i64) -> Self {
        self.rotation = degrees;
        self
    }
}

/// What happened during an assembly.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyReport {
    /// Pages asked for.
    pub requested: usize,
    /// Pages present in the output.
    pub copied: usize,
    /// One line per page that could not be copied.
    pub failures: Vec<String>,
}

/// Build a new document from `picks`, in pick order.
///
/// A pick that cannot be copied is logged and skipped; the call only fails
/// when no page at all could be copied.
pub fn assemble(
    sources: Vec<Document>,
    picks: &[PageRef],
    metadata: Option<&DocumentMetadata>,
) -> Result<(Document, CopyReport), PdfOpsError> {
    let version = sources
        .iter()
        .map(|d| d.version.clone())
        .max()
        .unwrap_or_else(|| "1.5".to_string());
    let mut out = Document::with_version(version);

    // Page maps of every source, expressed in the destination id space.
    let mut page_maps: Vec<BTreeMap<u32, ObjectId>> = Vec::with_capacity(sources.len());
    for mut src in sources {
        src.renumber_objects_with(out.max_id + 1);
        out.max_id = out.max_id.max(src.max_id);
        page_maps.push(src.get_pages());
        out.objects.extend(src.objects);
    }

    let pages_id = out.new_object_id();
    let mut report = CopyReport {
        requested: picks.len(),
        ..Default::default()
    };
    let mut kids: Vec<Object> = Vec::with_capacity(picks.len());

    for pick in picks {
        let Some(&page_id) = page_maps.get(pick.source).and_then(|m| m.get(&pick.page)) else {
            let msg = format!("source {} has no page {}", pick.source + 1, pick.page);
            warn!("Skipping page: {}", msg);
            report.failures.push(msg);
            continue;
        };
        match copy_page(&out, page_id, pages_id, pick.rotation) {
            Ok(dict) => {
                let id = out.add_object(dict);
                kids.push(Object::Reference(id));
            }
            Err(e) => {
                let msg = format!("source {} page {}: {}", pick.source + 1, pick.page, e);
                warn!("Skipping page: {}", msg);
                report.failures.push(msg);
            }
        }
    }

    if kids.is_empty() {
        return Err(PdfOpsError::NoPagesCopied {
            requested: picks.len(),
        });
    }
    report.copied = kids.len();

    let count = kids.len() as i64;
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    if let Some(meta) = metadata.filter(|m| !m.is_empty()) {
        let info_id = out.add_object(meta.to_info_dictionary());
        out.trailer.set("Info", info_id);
    }

    let pruned = out.prune_objects();
    out.renumber_objects();
    debug!(
        "Assembled {} of {} pages ({} unreachable objects pruned)",
        report.copied,
        report.requested,
        pruned.len()
    );
    Ok((out, report))
}

/// Clone a page dictionary and make it self-contained under `parent`.
fn copy_page(
    doc: &Document,
    page_id: ObjectId,
    parent: ObjectId,
    extra_rotation: i64,
) -> Result<Dictionary, PdfOpsError> {
    let mut dict = doc.get_dictionary(page_id)?.clone();

    for key in INHERITABLE {
        if !dict.has(key) {
            if let Some(value) = inherited_attribute(doc, &dict, key) {
                dict.set(key.to_vec(), value);
            }
        }
    }
    if !dict.has(b"MediaBox") {
        let mediabox: Vec<Object> = DEFAULT_MEDIABOX.iter().map(|&v| Object::Integer(v)).collect();
        dict.set("MediaBox", mediabox);
    }

    let current = dict.get(b"Rotate").and_then(Object::as_i64).unwrap_or(0);
    let rotate = normalize_rotation(current + extra_rotation);
    if rotate == 0 {
        dict.remove(b"Rotate");
    } else {
        dict.set("Rotate", rotate);
    }

    dict.set("Parent", parent);
    Ok(dict)
}

/// Walk up the `/Parent` chain looking for `key`.
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut next = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = next {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let node = doc.get_dictionary(id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        next = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}
