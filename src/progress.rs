//! Progress-callback trait for OCR page events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::EngineConfigBuilder::progress_callback`] to receive
//! events while the OCR pipeline rasterises and recognises each page.
//!
//! # Example
//!
//! ```rust
//! use pdfsmith::{EngineConfig, OcrProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl OcrProgressCallback for Counter {
//!     fn on_page_complete(&self, _page: u32, _total: u32, _text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the OCR pipeline as it processes each page.
///
/// Pages run concurrently, so the page methods may be called from several
/// tasks at once. All methods default to no-ops.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once before any page is rasterised.
    fn on_ocr_start(&self, total_pages: u32) {
        let _ = total_pages;
    }

    /// Called when a page enters rasterisation.
    fn on_page_start(&self, page: u32, total_pages: u32) {
        let _ = (page, total_pages);
    }

    /// Called when a page was recognised. `text_len` is the byte length of
    /// the recognised text (0 for PDF output).
    fn on_page_complete(&self, page: u32, total_pages: u32, text_len: usize) {
        let _ = (page, total_pages, text_len);
    }

    /// Called when a page is dropped from the output.
    fn on_page_error(&self, page: u32, total_pages: u32, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_ocr_complete(&self, total_pages: u32, success_count: u32) {
        let _ = (total_pages, success_count);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::EngineConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;
