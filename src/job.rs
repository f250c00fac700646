//! Conversion jobs: what the caller asks the engine to do.
//!
//! A [`ConversionJob`] is created by the calling application, handed to
//! [`crate::Orchestrator::process`], and consumed entirely within that call.
//! Free-form options travel in a JSON map so the caller can forward request
//! parameters without the engine knowing the caller's types; typed accessors
//! below read the keys each operation understands.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::pdf_ops::DocumentMetadata;

/// The kind of work a job performs. Each kind has its own strategy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Word-processing document (doc, docx, odt, rtf) → PDF.
    OfficeToPdf,
    /// Spreadsheet (xls, xlsx, ods, csv) → PDF.
    SpreadsheetToPdf,
    /// Presentation (ppt, pptx, odp) → PDF.
    PresentationToPdf,
    /// Raster image (png, jpeg, tiff, bmp, gif) → PDF.
    ImageToPdf,
    /// Plain text → PDF.
    TextToPdf,
    /// Keep only the selected pages.
    ExtractPages,
    /// Drop the selected pages.
    RemovePages,
    /// Concatenate several PDFs in input order.
    MergePdfs,
    /// Reorder, duplicate and rotate pages.
    OrganizePages,
    /// Produce a searchable PDF (or plain text) from scanned pages.
    Ocr,
}

impl OperationKind {
    pub const ALL: [OperationKind; 10] = [
        OperationKind::OfficeToPdf,
        OperationKind::SpreadsheetToPdf,
        OperationKind::PresentationToPdf,
        OperationKind::ImageToPdf,
        OperationKind::TextToPdf,
        OperationKind::ExtractPages,
        OperationKind::RemovePages,
        OperationKind::MergePdfs,
        OperationKind::OrganizePages,
        OperationKind::Ocr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::OfficeToPdf => "office-to-pdf",
            OperationKind::SpreadsheetToPdf => "spreadsheet-to-pdf",
            OperationKind::PresentationToPdf => "presentation-to-pdf",
            OperationKind::ImageToPdf => "image-to-pdf",
            OperationKind::TextToPdf => "text-to-pdf",
            OperationKind::ExtractPages => "extract-pages",
            OperationKind::RemovePages => "remove-pages",
            OperationKind::MergePdfs => "merge-pdfs",
            OperationKind::OrganizePages => "organize-pages",
            OperationKind::Ocr => "ocr",
        }
    }

    /// Input file extensions accepted by the kind. PDF kinds return `["pdf"]`.
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        match self {
            OperationKind::OfficeToPdf => &["doc", "docx", "odt", "rtf", "wpd", "dot", "dotx"],
            OperationKind::SpreadsheetToPdf => &["xls", "xlsx", "ods", "csv"],
            OperationKind::PresentationToPdf => &["ppt", "pptx", "odp", "pps", "ppsx"],
            OperationKind::ImageToPdf => {
                &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif"]
            }
            OperationKind::TextToPdf => &["txt", "text", "log", "md"],
            OperationKind::Ocr => &["pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp"],
            OperationKind::ExtractPages
            | OperationKind::RemovePages
            | OperationKind::MergePdfs
            | OperationKind::OrganizePages => &["pdf"],
        }
    }

    /// Whether every input must carry the `%PDF` magic bytes.
    pub fn requires_pdf_input(&self) -> bool {
        matches!(
            self,
            OperationKind::ExtractPages
                | OperationKind::RemovePages
                | OperationKind::MergePdfs
                | OperationKind::OrganizePages
        )
    }

    /// Kinds whose options name pages of the input document.
    pub fn is_page_set_edit(&self) -> bool {
        matches!(
            self,
            OperationKind::ExtractPages | OperationKind::RemovePages | OperationKind::OrganizePages
        )
    }

    /// The to-PDF conversion kind whose accepted extensions include the
    /// extension of `path`.
    pub fn conversion_for(path: &Path) -> Option<OperationKind> {
        let ext = extension_of(path);
        [
            OperationKind::OfficeToPdf,
            OperationKind::SpreadsheetToPdf,
            OperationKind::PresentationToPdf,
            OperationKind::ImageToPdf,
            OperationKind::TextToPdf,
        ]
        .into_iter()
        .find(|k| k.accepted_extensions().contains(&ext.as_str()))
    }

    /// Kinds that consume `additional_inputs`.
    pub fn accepts_multiple_inputs(&self) -> bool {
        matches!(self, OperationKind::MergePdfs | OperationKind::ImageToPdf)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        OperationKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| format!("unknown operation kind '{s}'"))
    }
}

/// A single request to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub kind: OperationKind,
    /// Primary input file.
    pub input_path: PathBuf,
    /// Further inputs, appended after `input_path` (merge and images only).
    #[serde(default)]
    pub additional_inputs: Vec<PathBuf>,
    /// Where the final artifact is written.
    pub output_path: PathBuf,
    /// Operation-specific options. See the accessor methods for known keys.
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

impl ConversionJob {
    pub fn new(
        kind: OperationKind,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            input_path: input_path.into(),
            additional_inputs: Vec::new(),
            output_path: output_path.into(),
            options: HashMap::new(),
        }
    }

    /// Add an input to be merged after the ones already present.
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.additional_inputs.push(path.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// All inputs in order: primary first.
    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.input_path.as_path())
            .chain(self.additional_inputs.iter().map(PathBuf::as_path))
    }

    pub fn input_count(&self) -> usize {
        1 + self.additional_inputs.len()
    }

    /// String option. Numbers are rendered so `"pages": 3` works like `"3"`.
    pub fn opt_str(&self, key: &str) -> Option<String> {
        match self.options.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(","))
                }
            }
            _ => None,
        }
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        match self.options.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn opt_bool(&self, key: &str) -> Option<bool> {
        match self.options.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_u64().map(|v| v != 0),
            _ => None,
        }
    }

    /// Page selection for extract/remove (`"pages"`).
    pub fn pages_spec(&self) -> Option<String> {
        self.opt_str("pages")
    }

    /// Page layout for organize (`"layout"`, e.g. `"3,1:90,2"`).
    pub fn layout_spec(&self) -> Option<String> {
        self.opt_str("layout")
    }

    /// Output document metadata from `title`, `author`, `subject`, `keywords`.
    pub fn metadata(&self) -> Option<DocumentMetadata> {
        let meta = DocumentMetadata {
            title: self.opt_str("title"),
            author: self.opt_str("author"),
            subject: self.opt_str("subject"),
            keywords: self.opt_str("keywords"),
        };
        if meta.is_empty() {
            None
        } else {
            Some(meta)
        }
    }

    /// Per-job override of the conversion timeout (`"timeout_secs"`).
    pub fn timeout_secs(&self) -> Option<u64> {
        self.opt_u64("timeout_secs").filter(|s| *s > 0)
    }
}

pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("pdf-to-word".parse::<OperationKind>().is_err());
    }

    #[test]
    fn conversion_kind_from_extension() {
        assert_eq!(
            OperationKind::conversion_for(Path::new("Q3.XLSX")),
            Some(OperationKind::SpreadsheetToPdf)
        );
        assert_eq!(
            OperationKind::conversion_for(Path::new("scan.tif")),
            Some(OperationKind::ImageToPdf)
        );
        assert_eq!(OperationKind::conversion_for(Path::new("book.pdf")), None);
        assert_eq!(OperationKind::conversion_for(Path::new("README")), None);
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let s = serde_json::to_string(&OperationKind::RemovePages).unwrap();
        assert_eq!(s, "\"remove-pages\"");
    }

    #[test]
    fn option_accessors_accept_loose_types() {
        let job = ConversionJob::new(OperationKind::ExtractPages, "in.pdf", "out.pdf")
            .with_option("pages", json!([1, "3-5"]))
            .with_option("dpi", "300")
            .with_option("text_only", "yes")
            .with_option("timeout_secs", 0);

        assert_eq!(job.pages_spec().as_deref(), Some("1,3-5"));
        assert_eq!(job.opt_u64("dpi"), Some(300));
        assert_eq!(job.opt_bool("text_only"), Some(true));
        assert_eq!(job.timeout_secs(), None);
    }

    #[test]
    fn metadata_only_when_some_field_set() {
        let job = ConversionJob::new(OperationKind::MergePdfs, "a.pdf", "out.pdf");
        assert!(job.metadata().is_none());

        let job = job.with_option("title", "Quarterly report");
        let meta = job.metadata().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Quarterly report"));
        assert!(meta.author.is_none());
    }

    #[test]
    fn inputs_keep_order() {
        let job = ConversionJob::new(OperationKind::MergePdfs, "a.pdf", "out.pdf")
            .with_input("b.pdf")
            .with_input("c.pdf");
        let names: Vec<_> = job.inputs().map(|p| p.to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(job.input_count(), 3);
    }
}
