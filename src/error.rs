//! Error types for the pdfsmith library.
//!
//! Failures fall into tiers that the orchestrator treats differently:
//!
//! * [`ConvertError`]: **Terminal**: the job cannot be attempted at all
//!   (missing input, a page selection that leaves nothing to produce) or
//!   every strategy has been tried. The orchestrator turns these into a
//!   failed [`crate::output::ConversionResult`]; they never escape
//!   [`crate::Orchestrator::process`].
//!
//! * [`ToolUnavailable`]: a strategy's precondition does not hold. The
//!   strategy is skipped, not attempted.
//!
//! * [`StrategyError`]: **Recovered**: one strategy failed (non-zero exit,
//!   timeout, bad output). Captured as a failed attempt; the chain moves on.
//!
//! * [`PageError`]: **Non-fatal**: one OCR page failed. The page is omitted
//!   from the assembled output and the pipeline continues.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::job::OperationKind;

/// Fatal errors that end a job before or after the strategy chain.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input was missing, unreadable, empty or of the wrong format.
    #[error(transparent)]
    Input(#[from] InputError),

    /// The requested page selection is invalid or leaves no pages.
    #[error(transparent)]
    PageRange(#[from] PageRangeError),

    /// Every applicable strategy failed, or none was applicable.
    #[error("No strategy could perform {kind} ({attempts} attempted)")]
    Exhausted { kind: OperationKind, attempts: usize },

    /// Unexpected internal error (task join failure, runtime creation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Coarse category reported on [`crate::output::ConversionResult`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Input(_) => ErrorKind::Input,
            ConvertError::PageRange(_) => ErrorKind::PageRange,
            ConvertError::Exhausted { .. } => ErrorKind::Exhausted,
            ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Serializable category of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Input,
    PageRange,
    Exhausted,
    Internal,
}

/// An [`crate::EngineConfig`] failed validation in `build()`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Problems with the files a job was given.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    #[error("Input file is empty: '{path}'")]
    Empty { path: PathBuf },

    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    #[error("Unsupported input format '{extension}' for {kind}")]
    UnsupportedFormat {
        kind: OperationKind,
        extension: String,
    },

    #[error("{kind} takes a single input file, got {got}")]
    TooManyInputs { kind: OperationKind, got: usize },

    #[error("{kind} needs at least {needed} input files, got {got}")]
    MissingInput {
        kind: OperationKind,
        needed: usize,
        got: usize,
    },
}

/// An invalid or empty page selection. Never recovered by fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageRangeError {
    #[error("Page selection '{spec}' matches no page of a {total}-page document")]
    Empty { spec: String, total: u32 },

    #[error("Removing pages '{spec}' would leave none of the {total} pages")]
    RemovesAllPages { spec: String, total: u32 },

    #[error("Rotation {degrees} in '{token}' is not a multiple of 90")]
    InvalidRotation { token: String, degrees: i64 },

    #[error("Operation needs a page selection but none was given")]
    Missing,

    #[error("Could not determine the page count of '{path}': {detail}")]
    UnknownPageCount { path: PathBuf, detail: String },
}

/// A strategy's precondition was not met; the strategy is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ToolUnavailable {
    pub reason: String,
}

impl ToolUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A time limit for messages: whole seconds, or milliseconds below one
/// second.
pub(crate) fn format_limit(limit: &Duration) -> String {
    if limit.as_secs() == 0 {
        format!("{}ms", limit.as_millis())
    } else {
        format!("{}s", limit.as_secs())
    }
}

/// A single strategy attempt failed. Captured, never propagated.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code:?}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{program}' timed out after {} and was killed", format_limit(.timeout))]
    Timeout { program: String, timeout: Duration },

    #[error("Expected output was not produced: {detail}")]
    MissingArtifact { detail: String },

    #[error(transparent)]
    Pdf(#[from] PdfOpsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl StrategyError {
    /// Raw details kept out of the primary message.
    pub fn diagnostics(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("error".to_string(), self.to_string());
        match self {
            StrategyError::NonZeroExit {
                program,
                code,
                stderr,
            } => {
                map.insert("program".into(), program.clone());
                map.insert(
                    "exit_code".into(),
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                );
                if !stderr.trim().is_empty() {
                    map.insert("stderr".into(), stderr.trim().to_string());
                }
            }
            StrategyError::Timeout { program, timeout } => {
                map.insert("program".into(), program.clone());
                map.insert("timeout_secs".into(), timeout.as_secs().to_string());
                map.insert("timeout_ms".into(), timeout.as_millis().to_string());
            }
            StrategyError::Spawn { program, source } => {
                map.insert("program".into(), program.clone());
                map.insert("io".into(), source.to_string());
            }
            _ => {}
        }
        map
    }
}

/// Errors from the in-process PDF object model.
#[derive(Debug, Error)]
pub enum PdfOpsError {
    #[error("Could not parse PDF '{path}': {detail}")]
    Load { path: PathBuf, detail: String },

    #[error("Could not write PDF '{path}': {detail}")]
    Save { path: PathBuf, detail: String },

    #[error("None of the {requested} requested pages could be copied")]
    NoPagesCopied { requested: usize },

    #[error("PDF '{path}' is encrypted")]
    Encrypted { path: PathBuf },

    #[error("Image '{path}' could not be embedded: {detail}")]
    Image { path: PathBuf, detail: String },

    #[error("Malformed PDF object: {0}")]
    Object(String),

    #[error(transparent)]
    PageRange(#[from] PageRangeError),
}

impl From<lopdf::Error> for PdfOpsError {
    fn from(e: lopdf::Error) -> Self {
        PdfOpsError::Object(e.to_string())
    }
}

/// A non-fatal error for a single OCR page.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PageError {
    #[error("Page {page}: rasterisation failed: {detail}")]
    RasterizeFailed { page: u32, detail: String },

    #[error("Page {page}: text recognition failed: {detail}")]
    RecognizeFailed { page: u32, detail: String },

    #[error("Page {page}: {stage} timed out after {secs}s")]
    Timeout {
        page: u32,
        stage: String,
        secs: u64,
    },
}

impl PageError {
    pub fn page(&self) -> u32 {
        match self {
            PageError::RasterizeFailed { page, .. }
            | PageError::RecognizeFailed { page, .. }
            | PageError::Timeout { page, .. } => *page,
        }
    }
}
