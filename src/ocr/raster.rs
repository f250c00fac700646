//! Page rasterisation for OCR.
//!
//! Backends, first available wins per page: in-process pdfium (feature
//! `pdfium`, library detected; bound once and driven from one thread),
//! `pdftoppm`, Ghostscript. A backend failure
//! on one page falls through to the next backend for that page only.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PageError, StrategyError};
use crate::exec::ToolCommand;
use crate::tools::{ToolName, ToolRegistry};

/// Turns PDF pages into images.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render 1-based `page` of `input` at `dpi` into `out_dir`.
    async fn rasterize(
        &self,
        input: &Path,
        page: u32,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, PageError>;

    /// Render every page in one call, for when the page count is unknown.
    /// Returns `(page, image)` pairs in any order.
    async fn rasterize_all(
        &self,
        input: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<(u32, PathBuf)>, StrategyError>;
}

/// Whether any backend can rasterise on this host.
pub fn any_rasterizer(registry: &ToolRegistry) -> bool {
    (cfg!(feature = "pdfium") && registry.is_available(ToolName::Pdfium))
        || registry.is_available(ToolName::Pdftoppm)
        || registry.is_available(ToolName::Ghostscript)
}

/// The production rasterizer over the detected tools.
pub struct ToolRasterizer {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolRasterizer {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    async fn with_pdftoppm(
        &self,
        exe: &Path,
        input: &Path,
        page: u32,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, StrategyError> {
        let prefix = out_dir.join(format!("page-{page}"));
        ToolCommand::new(exe, self.timeout)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .args(["-png", "-singlefile"])
            .arg(input)
            .arg(&prefix)
            .run()
            .await?;
        expect_file(prefix.with_extension("png"))
    }

    async fn with_ghostscript(
        &self,
        exe: &Path,
        input: &Path,
        page: u32,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, StrategyError> {
        let png = out_dir.join(format!("page-{page}.png"));
        ToolCommand::new(exe, self.timeout)
            .args(["-dSAFER", "-dBATCH", "-dNOPAUSE", "-dQUIET", "-sDEVICE=png16m"])
            .arg(format!("-r{dpi}"))
            .arg(format!("-dFirstPage={page}"))
            .arg(format!("-dLastPage={page}"))
            .arg(format!("-sOutputFile={}", png.display()))
            .arg(input)
            .run()
            .await?;
        expect_file(png)
    }
}

#[async_trait]
impl PageRasterizer for ToolRasterizer {
    async fn rasterize(
        &self,
        input: &Path,
        page: u32,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, PageError> {
        let mut last_error = String::from("no rasterizer is installed");

        #[cfg(feature = "pdfium")]
        if let Some(lib) = self.registry.path(ToolName::Pdfium) {
            match pdfium_backend::render(lib, input, page, dpi, out_dir).await {
                Ok(path) => return Ok(path),
                Err(e) => {
                    debug!("pdfium could not render page {}: {}", page, e);
                    last_error = e;
                }
            }
        }

        if let Some(exe) = self.registry.path(ToolName::Pdftoppm) {
            match self.with_pdftoppm(exe, input, page, dpi, out_dir).await {
                Ok(path) => return Ok(path),
                Err(StrategyError::Timeout { timeout, .. }) => {
                    return Err(PageError::Timeout {
                        page,
                        stage: "rasterisation".into(),
                        secs: timeout.as_secs(),
                    })
                }
                Err(e) => {
                    debug!("pdftoppm failed on page {}: {}", page, e);
                    last_error = e.to_string();
                }
            }
        }

        if let Some(exe) = self.registry.path(ToolName::Ghostscript) {
            match self.with_ghostscript(exe, input, page, dpi, out_dir).await {
                Ok(path) => return Ok(path),
                Err(StrategyError::Timeout { timeout, .. }) => {
                    return Err(PageError::Timeout {
                        page,
                        stage: "rasterisation".into(),
                        secs: timeout.as_secs(),
                    })
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(PageError::RasterizeFailed {
            page,
            detail: last_error,
        })
    }

    async fn rasterize_all(
        &self,
        input: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<(u32, PathBuf)>, StrategyError> {
        // One pass over an unknown number of pages; the limit scales with
        // the usual per-page budget.
        let timeout = self.timeout * 10;
        if let Some(exe) = self.registry.path(ToolName::Pdftoppm) {
            ToolCommand::new(exe, timeout)
                .arg("-r")
                .arg(dpi.to_string())
                .arg("-png")
                .arg(input)
                .arg(out_dir.join("page"))
                .run()
                .await?;
        } else if let Some(exe) = self.registry.path(ToolName::Ghostscript) {
            ToolCommand::new(exe, timeout)
                .args(["-dSAFER", "-dBATCH", "-dNOPAUSE", "-dQUIET", "-sDEVICE=png16m"])
                .arg(format!("-r{dpi}"))
                .arg(format!("-sOutputFile={}", out_dir.join("page-%d.png").display()))
                .arg(input)
                .run()
                .await?;
        } else {
            return Err(StrategyError::Internal(
                "no command-line rasterizer is installed".into(),
            ));
        }
        numbered_pages(out_dir)
    }
}

static NUMBERED_PNG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(\d+)\.png$").expect("valid page image regex"));

/// Collect `prefix-N.png` files (pdftoppm zero-pads N) as `(N, path)`.
pub fn numbered_pages(dir: &Path) -> Result<Vec<(u32, PathBuf)>, StrategyError> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_string_lossy().into_owned();
            let n = NUMBERED_PNG.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((n, path))
        })
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    if pages.is_empty() {
        warn!("Rasterizer produced no page images in {}", dir.display());
    }
    Ok(pages)
}

fn expect_file(path: PathBuf) -> Result<PathBuf, StrategyError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(StrategyError::MissingArtifact {
            detail: format!("{} was not written", path.display()),
        })
    }
}

#[cfg(feature = "pdfium")]
mod pdfium_backend {
    use once_cell::sync::OnceCell;
    use pdfium_render::prelude::*;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tracing::debug;

    /// An open document is dropped after this long without a request.
    const IDLE_CLOSE: Duration = Duration::from_secs(5);

    pub(super) struct RenderRequest {
        input: PathBuf,
        page: u32,
        dpi: u32,
        png: PathBuf,
        reply: oneshot::Sender<Result<(), String>>,
    }

    /// Queue of the single thread that owns the bound library. Pages from
    /// every pipeline render there in arrival order.
    pub(super) static WORKER: OnceCell<mpsc::Sender<RenderRequest>> = OnceCell::new();

    /// Render one page on the pdfium thread.
    pub async fn render(
        lib: &Path,
        input: &Path,
        page: u32,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, String> {
        let lib = lib.to_path_buf();
        let worker = tokio::task::spawn_blocking(move || worker(&lib))
            .await
            .map_err(|e| format!("pdfium start panicked: {e}"))??;

        let png = out_dir.join(format!("page-{page}.png"));
        let (reply, done) = oneshot::channel();
        worker
            .send(RenderRequest {
                input: input.to_path_buf(),
                page,
                dpi,
                png: png.clone(),
                reply,
            })
            .map_err(|_| "pdfium thread has stopped".to_string())?;
        done.await
            .map_err(|_| "pdfium thread dropped the request".to_string())??;
        Ok(png)
    }

    /// Start the pdfium thread on first use, bound to `lib`. Later calls
    /// reuse it. A failed bind is not cached.
    fn worker(lib: &Path) -> Result<&'static mpsc::Sender<RenderRequest>, String> {
        WORKER.get_or_try_init(|| {
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let (tx, rx) = mpsc::channel::<RenderRequest>();
            let lib = lib.to_path_buf();
            std::thread::Builder::new()
                .name("pdfium".into())
                .spawn(move || {
                    let bindings = match Pdfium::bind_to_library(&lib) {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = ready_tx.send(Err(format!("bind failed: {e:?}")));
                            return;
                        }
                    };
                    let pdfium = Pdfium::new(bindings);
                    debug!("Bound pdfium from {}", lib.display());
                    let _ = ready_tx.send(Ok(()));
                    serve(&pdfium, &rx);
                })
                .map_err(|e| format!("cannot start pdfium thread: {e}"))?;
            ready_rx
                .recv()
                .map_err(|_| "pdfium thread exited while binding".to_string())??;
            Ok(tx)
        })
    }

    fn serve(pdfium: &Pdfium, requests: &mpsc::Receiver<RenderRequest>) {
        let mut open: Option<(PathBuf, PdfDocument<'_>)> = None;
        loop {
            match requests.recv_timeout(IDLE_CLOSE) {
                Ok(request) => {
                    let result = render_page(pdfium, &mut open, &request);
                    let _ = request.reply.send(result);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => open = None,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn render_page<'a>(
        pdfium: &'a Pdfium,
        open: &mut Option<(PathBuf, PdfDocument<'a>)>,
        request: &RenderRequest,
    ) -> Result<(), String> {
        let RenderRequest {
            input,
            page,
            dpi,
            png,
            ..
        } = request;
        if open.as_ref().map(|(path, _)| path) != Some(input) {
            *open = None;
            let document = pdfium
                .load_pdf_from_file(input, None)
                .map_err(|e| format!("load failed: {e:?}"))?;
            debug!("pdfium opened {}", input.display());
            *open = Some((input.clone(), document));
        }
        let Some((_, document)) = open.as_ref() else {
            return Err("document is not open".into());
        };

        let index = u16::try_from(page.saturating_sub(1))
            .map_err(|_| format!("page {page} is beyond pdfium's index range"))?;
        let pdf_page = document
            .pages()
            .get(index)
            .map_err(|e| format!("no page {page}: {e:?}"))?;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(*dpi as f32 / 72.0);
        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| format!("render failed: {e:?}"))?;
        let image = bitmap.as_image();
        debug!(
            "pdfium rendered page {} → {}x{} px",
            page,
            image.width(),
            image.height()
        );
        image.save(png).map_err(|e| format!("PNG write failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolBinary;

    #[test]
    fn numbered_pages_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-02.png", "page-1.png", "notes.txt", "page-x.png"] {
            std::fs::write(dir.path().join(name), b"png").unwrap();
        }
        let pages: Vec<u32> = numbered_pages(dir.path())
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(pages, vec![1, 2, 10]);
    }

    #[test]
    fn rasterizer_availability() {
        assert!(!any_rasterizer(&ToolRegistry::empty()));
        let reg = ToolRegistry::from_tools([ToolBinary::found(ToolName::Ghostscript, "/usr/bin/gs", None)]);
        assert!(any_rasterizer(&reg));
    }

    #[cfg(feature = "pdfium")]
    #[tokio::test]
    async fn failed_pdfium_bind_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let err = pdfium_backend::render(
            Path::new("/nonexistent/libpdfium.so"),
            Path::new("in.pdf"),
            1,
            150,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(err.contains("bind failed"), "{err}");
        assert!(pdfium_backend::WORKER.get().is_none());
    }

    #[tokio::test]
    async fn no_backend_is_a_page_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = ToolRasterizer::new(Arc::new(ToolRegistry::empty()), Duration::from_secs(1));
        let err = r
            .rasterize(Path::new("in.pdf"), 2, 150, dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.page(), 2);
        assert!(matches!(err, PageError::RasterizeFailed { .. }));
    }
}
