//! Engine configuration.
//!
//! Every knob the engine reads lives in [`EngineConfig`], built through
//! [`EngineConfigBuilder`]. Defaults are usable as-is: a host only needs a
//! config when it wants different timeouts, OCR defaults, or explicit tool
//! paths.
//!
//! # Example
//! ```rust
//! use pdfsmith::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::builder()
//!     .conversion_timeout(Duration::from_secs(120))
//!     .ocr_concurrency(2)
//!     .default_ocr_language("eng+deu")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.ocr_concurrency, 2);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::progress::ProgressCallback;
use crate::tools::ToolName;

/// Configuration shared by every job an [`crate::Orchestrator`] runs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limit on a tool's version probe. Default: 10 s.
    pub probe_timeout: Duration,

    /// Limit on one document conversion by an external suite. Default: 300 s.
    ///
    /// Jobs can override it with the `timeout_secs` option.
    pub conversion_timeout: Duration,

    /// Limit on one page-tool invocation (qpdf, ImageMagick). Default: 120 s.
    pub page_tool_timeout: Duration,

    /// Limit on rasterising one OCR page. Default: 120 s.
    pub rasterize_timeout: Duration,

    /// Limit on recognising one OCR page. Default: 120 s.
    pub ocr_page_timeout: Duration,

    /// Pages rasterised and recognised at once. Default: 4.
    pub ocr_concurrency: usize,

    /// OCR resolution when the job gives none. Range: 72–600. Default: 300.
    pub default_ocr_dpi: u32,

    /// Tesseract language when the job gives none, e.g. `eng` or `eng+fra`.
    pub default_ocr_language: String,

    /// Resolution assumed for image-to-PDF pages. Default: 96.
    pub default_image_dpi: u32,

    /// Separator between pages of OCR text output.
    pub page_separator: PageSeparator,

    /// Explicit executable (or library) paths, checked before any search.
    pub tool_overrides: BTreeMap<ToolName, PathBuf>,

    /// Keep per-attempt workspaces on disk instead of deleting them.
    pub keep_workspaces: bool,

    /// Receives OCR page events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            conversion_timeout: Duration::from_secs(300),
            page_tool_timeout: Duration::from_secs(120),
            rasterize_timeout: Duration::from_secs(120),
            ocr_page_timeout: Duration::from_secs(120),
            ocr_concurrency: 4,
            default_ocr_dpi: 300,
            default_ocr_language: "eng".to_string(),
            default_image_dpi: crate::pdf_ops::image::DEFAULT_IMAGE_DPI,
            page_separator: PageSeparator::default(),
            tool_overrides: BTreeMap::new(),
            keep_workspaces: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("probe_timeout", &self.probe_timeout)
            .field("conversion_timeout", &self.conversion_timeout)
            .field("page_tool_timeout", &self.page_tool_timeout)
            .field("rasterize_timeout", &self.rasterize_timeout)
            .field("ocr_page_timeout", &self.ocr_page_timeout)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("default_ocr_dpi", &self.default_ocr_dpi)
            .field("default_ocr_language", &self.default_ocr_language)
            .field("default_image_dpi", &self.default_image_dpi)
            .field("page_separator", &self.page_separator)
            .field("tool_overrides", &self.tool_overrides)
            .field("keep_workspaces", &self.keep_workspaces)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn OcrProgressCallback>"),
            )
            .finish()
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Conversion timeout, or the job's own override when it has one.
    pub fn conversion_timeout_for(&self, job_override: Option<u64>) -> Duration {
        job_override
            .map(Duration::from_secs)
            .unwrap_or(self.conversion_timeout)
    }

    /// Clamp a requested OCR resolution into the supported range.
    pub fn clamp_ocr_dpi(dpi: u32) -> u32 {
        dpi.clamp(MIN_OCR_DPI, MAX_OCR_DPI)
    }
}

pub const MIN_OCR_DPI: u32 = 72;
pub const MAX_OCR_DPI: u32 = 600;

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn probe_timeout(mut self, d: Duration) -> Self {
        self.config.probe_timeout = d;
        self
    }

    pub fn conversion_timeout(mut self, d: Duration) -> Self {
        self.config.conversion_timeout = d;
        self
    }

    pub fn page_tool_timeout(mut self, d: Duration) -> Self {
        self.config.page_tool_timeout = d;
        self
    }

    pub fn rasterize_timeout(mut self, d: Duration) -> Self {
        self.config.rasterize_timeout = d;
        self
    }

    pub fn ocr_page_timeout(mut self, d: Duration) -> Self {
        self.config.ocr_page_timeout = d;
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn default_ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.default_ocr_dpi = EngineConfig::clamp_ocr_dpi(dpi);
        self
    }

    pub fn default_ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.default_ocr_language = lang.into();
        self
    }

    pub fn default_image_dpi(mut self, dpi: u32) -> Self {
        self.config.default_image_dpi = dpi;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    /// Use `path` for `tool` instead of searching for it.
    pub fn tool_override(mut self, tool: ToolName, path: impl Into<PathBuf>) -> Self {
        self.config.tool_overrides.insert(tool, path.into());
        self
    }

    pub fn keep_workspaces(mut self, v: bool) -> Self {
        self.config.keep_workspaces = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let c = &self.config;
        let timeouts = [
            ("probe_timeout", c.probe_timeout),
            ("conversion_timeout", c.conversion_timeout),
            ("page_tool_timeout", c.page_tool_timeout),
            ("rasterize_timeout", c.rasterize_timeout),
            ("ocr_page_timeout", c.ocr_page_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError(format!("{name} must be greater than zero")));
        }
        if c.ocr_concurrency == 0 {
            return Err(ConfigError("ocr_concurrency must be ≥ 1".into()));
        }
        if !(MIN_OCR_DPI..=MAX_OCR_DPI).contains(&c.default_ocr_dpi) {
            return Err(ConfigError(format!(
                "default_ocr_dpi must be {MIN_OCR_DPI}–{MAX_OCR_DPI}, got {}",
                c.default_ocr_dpi
            )));
        }
        if c.default_image_dpi == 0 {
            return Err(ConfigError("default_image_dpi must be ≥ 1".into()));
        }
        if !is_valid_language(&c.default_ocr_language) {
            return Err(ConfigError(format!(
                "default_ocr_language '{}' is not a tesseract language list",
                c.default_ocr_language
            )));
        }
        Ok(self.config)
    }
}

/// Tesseract language lists look like `eng` or `eng+chi_sim`.
pub fn is_valid_language(lang: &str) -> bool {
    !lang.is_empty()
        && lang
            .split('+')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How pages are separated in OCR text output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Blank lines only.
    None,
    /// `--- Page N ---` between blank lines. (default)
    #[default]
    Marker,
    /// ASCII form feed, which `pdftotext` also emits.
    FormFeed,
    /// Custom text; `{page}` is replaced by the page number.
    Custom(String),
}

impl PageSeparator {
    /// Text placed before page `page_num` (1-indexed).
    pub fn render(&self, page_num: u32) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::Marker => format!("\n\n--- Page {page_num} ---\n\n"),
            PageSeparator::FormFeed => "\n\x0c".to_string(),
            PageSeparator::Custom(s) => s.replace("{page}", &page_num.to_string()),
        }
    }
}
