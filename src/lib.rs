//! # pdfsmith
//!
//! Convert office documents, text, images and scans to PDF, and edit the
//! page set of existing PDFs, using whatever tools the host has installed.
//!
//! ## Why this crate?
//!
//! No single tool handles every input on every machine. LibreOffice may be
//! missing, qpdf may not understand a damaged file, tesseract may only exist
//! on the build server. This crate discovers the installed tools once, then
//! runs each job through an ordered chain of strategies: external tools
//! where they exist, in-process `lopdf` implementations where they don't.
//! The first strategy that succeeds wins and every failed attempt is
//! reported.
//!
//! ## Job Flow
//!
//! ```text
//! ConversionJob
//!  │
//!  ├─ 1. Validate  inputs exist, are readable, non-empty, right format
//!  ├─ 2. Plan      page count + page selection for extract/remove/organize
//!  ├─ 3. Chain     strategies for the kind, filtered by tool availability
//!  ├─ 4. Attempt   each strategy in its own temp dir until one succeeds
//!  └─ 5. Publish   atomic copy to the output path → ConversionResult
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfsmith::{ConversionJob, EngineConfig, OperationKind, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Orchestrator::new(EngineConfig::default()).await;
//!     let job = ConversionJob::new(OperationKind::ExtractPages, "report.pdf", "summary.pdf")
//!         .with_option("pages", "1,3-5");
//!     let result = engine.process(&job).await;
//!     println!("{result}");
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdfsmith` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `pdfium` | on      | Rasterises OCR pages in-process when a libpdfium is found on the host |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfsmith = { version = "0.1", default-features = false, features = ["pdfium"] }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod exec;
pub mod job;
pub mod ocr;
pub mod orchestrator;
pub mod output;
pub mod page_range;
pub mod pdf_ops;
pub mod progress;
pub mod strategy;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, EngineConfigBuilder, PageSeparator};
pub use error::{
    ConfigError, ConvertError, ErrorKind, InputError, PageError, PageRangeError, PdfOpsError,
    StrategyError, ToolUnavailable,
};
pub use job::{ConversionJob, OperationKind};
pub use ocr::{OcrOptions, OcrPipeline, OcrReport};
pub use orchestrator::Orchestrator;
pub use output::{ConversionResult, SkippedStrategy, StrategyOutcome};
pub use page_range::{PageLayout, PagePlacement, PageSet};
pub use pdf_ops::DocumentMetadata;
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use strategy::{chain_for, Artifact, PagePlan, Strategy, StrategyContext};
pub use tools::{ToolBinary, ToolName, ToolRegistry};
