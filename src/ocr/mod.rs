//! OCR pipeline: rasterise each page, recognise each page, assemble.
//!
//! ```text
//! input.pdf ──► RasterizePages ──► RecognizeEachPage ──► AssembleOutput
//!                 (per page, bounded concurrency)          (sorted by page)
//! ```
//!
//! Pages are independent: a page that fails to rasterise or recognise is
//! logged, reported in [`OcrReport::page_errors`], and left out. If no page
//! is recognised the original input is copied to the output unchanged and
//! [`OcrReport::fallback_used`] is set.

pub mod assemble;
pub mod raster;
pub mod recognize;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{PageError, StrategyError};
use crate::job::{extension_of, ConversionJob};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::strategy::page_tool::resolve_page_count;
use crate::tools::{ToolName, ToolRegistry};

pub use raster::{PageRasterizer, ToolRasterizer};
pub use recognize::{PageRecognizer, RecognizedPage, TesseractRecognizer};

/// Per-run OCR options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrOptions {
    /// Tesseract language list, e.g. `eng` or `eng+deu`.
    pub language: String,
    pub dpi: u32,
    /// Produce plain text instead of a searchable PDF.
    pub text_only: bool,
}

impl OcrOptions {
    /// Options from a job's `language`, `dpi` and `text_only`, falling back
    /// to the engine defaults. Invalid languages fall back too.
    pub fn from_job(job: &ConversionJob, config: &EngineConfig) -> Self {
        let language = job
            .opt_str("language")
            .filter(|l| {
                let ok = crate::config::is_valid_language(l);
                if !ok {
                    warn!("Ignoring invalid OCR language '{}'", l);
                }
                ok
            })
            .unwrap_or_else(|| config.default_ocr_language.clone());
        let dpi = job
            .opt_u64("dpi")
            .map(|d| EngineConfig::clamp_ocr_dpi(d.min(u32::MAX as u64) as u32))
            .unwrap_or(config.default_ocr_dpi);
        Self {
            language,
            dpi,
            text_only: job.opt_bool("text_only").unwrap_or(false),
        }
    }
}

/// What an OCR run did.
#[derive(Debug, Clone, Serialize)]
pub struct OcrReport {
    /// Pages in the input, when known before rasterising.
    pub total_pages: Option<u32>,
    /// Pages present in the output, ascending.
    pub recognized: Vec<u32>,
    pub page_errors: Vec<PageError>,
    /// The input was copied unchanged because no page was recognised.
    pub fallback_used: bool,
    pub output_path: PathBuf,
    pub duration_ms: u64,
}

/// Input formats used directly as page 1, without rasterising.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

pub fn is_image_input(path: &Path) -> bool {
    IMAGE_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// The OCR pipeline over pluggable rasterise and recognise stages.
pub struct OcrPipeline {
    rasterizer: Arc<dyn PageRasterizer>,
    recognizer: Arc<dyn PageRecognizer>,
    registry: Arc<ToolRegistry>,
    config: Arc<EngineConfig>,
}

impl OcrPipeline {
    /// Pipeline over the detected tools. Fails when tesseract is missing.
    pub fn new(registry: Arc<ToolRegistry>, config: Arc<EngineConfig>) -> Result<Self, StrategyError> {
        let tesseract = registry
            .path(ToolName::Tesseract)
            .ok_or_else(|| StrategyError::Internal("tesseract is not installed".into()))?;
        let recognizer = Arc::new(TesseractRecognizer::new(tesseract, config.ocr_page_timeout));
        let rasterizer = Arc::new(ToolRasterizer::new(registry.clone(), config.rasterize_timeout));
        Ok(Self::with_stages(registry, config, rasterizer, recognizer))
    }

    pub fn with_stages(
        registry: Arc<ToolRegistry>,
        config: Arc<EngineConfig>,
        rasterizer: Arc<dyn PageRasterizer>,
        recognizer: Arc<dyn PageRecognizer>,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            registry,
            config,
        }
    }

    /// Run the pipeline, writing the result to `output`. `scratch` holds
    /// page images and fragments and is owned by the caller.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &OcrOptions,
        scratch: &Path,
    ) -> Result<OcrReport, StrategyError> {
        let start = Instant::now();
        let callback: ProgressCallback = self
            .config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let images_dir = scratch.join("images");
        let pages_dir = scratch.join("pages");
        tokio::fs::create_dir_all(&images_dir).await?;
        tokio::fs::create_dir_all(&pages_dir).await?;

        let concurrency = self.config.ocr_concurrency.max(1);
        let (total, results) = if is_image_input(input) {
            callback.on_ocr_start(1);
            let r = self
                .recognize_page(1, 1, input.to_path_buf(), options, &pages_dir, &callback)
                .await;
            (Some(1), vec![r])
        } else if let Some(total) = self.page_count(input).await {
            info!("OCR: {} page(s) at {} dpi, language {}", total, options.dpi, options.language);
            callback.on_ocr_start(total);
            let results = stream::iter(1..=total)
                .map(|page| {
                    let cb = callback.clone();
                    let images_dir = &images_dir;
                    let pages_dir = &pages_dir;
                    async move {
                        cb.on_page_start(page, total);
                        match self.rasterizer.rasterize(input, page, options.dpi, images_dir).await {
                            Ok(image) => {
                                self.recognize_page(page, total, image, options, pages_dir, &cb)
                                    .await
                            }
                            Err(e) => {
                                warn!("OCR page {} skipped: {}", page, e);
                                cb.on_page_error(page, total, &e.to_string());
                                Err(e)
                            }
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .collect::<Vec<_>>()
                .await;
            (Some(total), results)
        } else {
            warn!("Page count of {} is unknown; rasterising in one pass", input.display());
            let images = self
                .rasterizer
                .rasterize_all(input, options.dpi, &images_dir)
                .await?;
            let total = images.len() as u32;
            callback.on_ocr_start(total);
            let results = stream::iter(images)
                .map(|(page, image)| {
                    let cb = callback.clone();
                    let pages_dir = &pages_dir;
                    async move {
                        cb.on_page_start(page, total);
                        self.recognize_page(page, total, image, options, pages_dir, &cb)
                            .await
                    }
                })
                .buffer_unordered(concurrency)
                .collect::<Vec<_>>()
                .await;
            (None, results)
        };

        let mut recognized = Vec::new();
        let mut page_errors = Vec::new();
        for r in results {
            match r {
                Ok(page) => recognized.push(page),
                Err(e) => page_errors.push(e),
            }
        }
        // Re-establish page order regardless of completion order.
        recognized.sort_by_key(|p: &RecognizedPage| p.page);
        page_errors.sort_by_key(PageError::page);
        callback.on_ocr_complete(
            total.unwrap_or(recognized.len() as u32),
            recognized.len() as u32,
        );

        let fallback_used = if recognized.is_empty() {
            warn!(
                "OCR recognised no pages of {}; copying the input unchanged",
                input.display()
            );
            tokio::fs::copy(input, output).await?;
            true
        } else {
            if options.text_only {
                assemble::assemble_text(&recognized, &self.config.page_separator, output).await?;
            } else {
                assemble::assemble_pdf(
                    &recognized,
                    output,
                    &self.registry,
                    self.config.page_tool_timeout,
                )
                .await?;
            }
            false
        };

        let report = OcrReport {
            total_pages: total,
            recognized: recognized.iter().map(|p| p.page).collect(),
            page_errors,
            fallback_used,
            output_path: output.to_path_buf(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "OCR done: {} page(s) recognised, {} failed, {}ms",
            report.recognized.len(),
            report.page_errors.len(),
            report.duration_ms
        );
        Ok(report)
    }

    async fn recognize_page(
        &self,
        page: u32,
        total: u32,
        image: PathBuf,
        options: &OcrOptions,
        pages_dir: &Path,
        callback: &ProgressCallback,
    ) -> Result<RecognizedPage, PageError> {
        let base = pages_dir.join(format!("page-{page:05}"));
        let started = Instant::now();
        match self.recognizer.recognize(&image, page, options, &base).await {
            Ok(done) => {
                let text_len = if options.text_only {
                    tokio::fs::metadata(&done.path)
                        .await
                        .map(|m| m.len() as usize)
                        .unwrap_or(0)
                } else {
                    0
                };
                debug!("OCR page {} done in {}ms", page, started.elapsed().as_millis());
                callback.on_page_complete(page, total, text_len);
                Ok(done)
            }
            Err(e) => {
                warn!("OCR page {} skipped: {}", page, e);
                callback.on_page_error(page, total, &e.to_string());
                Err(e)
            }
        }
    }

    async fn page_count(&self, input: &Path) -> Option<u32> {
        match resolve_page_count(input, &self.registry, self.config.page_tool_timeout).await {
            Ok(n) => Some(n),
            Err(detail) => {
                debug!("Page count unavailable: {}", detail);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OperationKind;
    use serde_json::json;

    #[test]
    fn options_default_and_clamp() {
        let config = EngineConfig::default();
        let job = ConversionJob::new(OperationKind::Ocr, "scan.pdf", "out.pdf");
        let o = OcrOptions::from_job(&job, &config);
        assert_eq!(o.language, "eng");
        assert_eq!(o.dpi, 300);
        assert!(!o.text_only);

        let job = job
            .with_option("dpi", 5000)
            .with_option("language", "deu+eng")
            .with_option("text_only", json!(true));
        let o = OcrOptions::from_job(&job, &config);
        assert_eq!(o.dpi, 600);
        assert_eq!(o.language, "deu+eng");
        assert!(o.text_only);
    }

    #[test]
    fn invalid_language_falls_back() {
        let job = ConversionJob::new(OperationKind::Ocr, "scan.pdf", "out.pdf")
            .with_option("language", "eng;rm");
        assert_eq!(OcrOptions::from_job(&job, &EngineConfig::default()).language, "eng");
    }

    #[test]
    fn image_inputs_are_detected() {
        assert!(is_image_input(Path::new("scan.TIFF")));
        assert!(!is_image_input(Path::new("scan.pdf")));
    }
}
