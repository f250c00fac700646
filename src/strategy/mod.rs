//! Conversion strategies and the static chain per operation kind.
//!
//! A [`Strategy`] is one concrete way to perform an operation: a built-in
//! lopdf renderer, or an adapter around an external tool. Strategies are
//! stateless. [`chain_for`] returns the ordered list for a kind; the
//! [`crate::Orchestrator`] filters it by [`Strategy::check`] and runs what
//! remains until one succeeds.
//!
//! | Kind | Chain |
//! |------|-------|
//! | office / spreadsheet / presentation | `os-native-automation`, `unoconv`, `headless-suite` |
//! | text-to-pdf | `native-text-render`, `headless-suite` |
//! | image-to-pdf | `native-image-embed`, `imagemagick`, `headless-suite` |
//! | extract / remove / merge | `page-tool`, `native-page-copy` |
//! | organize | `native-page-copy` |
//! | ocr | `ocr-pipeline`, `original-passthrough` |

pub mod imagemagick;
pub mod native;
pub mod ocr;
pub mod office;
pub mod page_tool;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{StrategyError, ToolUnavailable};
use crate::job::{ConversionJob, OperationKind};
use crate::page_range::{PageLayout, PageSet};
use crate::tools::{ToolName, ToolRegistry};

pub use imagemagick::ImageMagick;
pub use native::{NativeImageEmbed, NativePageCopy, NativeTextRender};
pub use ocr::{OcrPipelineStrategy, OriginalPassthrough};
pub use office::{HeadlessSuite, OsNativeAutomation, Unoconv};
pub use page_tool::PageTool;

/// The resolved page work for a page-set job, computed before any
/// strategy runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePlan {
    /// Pages to keep, ascending. Removal is planned as its complement.
    Keep(PageSet),
    /// Ordered placements for organize.
    Layout(PageLayout),
}

impl PagePlan {
    pub fn keep(&self) -> Option<&PageSet> {
        match self {
            PagePlan::Keep(set) => Some(set),
            PagePlan::Layout(_) => None,
        }
    }

    pub fn layout(&self) -> Option<&PageLayout> {
        match self {
            PagePlan::Layout(layout) => Some(layout),
            PagePlan::Keep(_) => None,
        }
    }

    /// Pages in the output.
    pub fn output_len(&self) -> usize {
        match self {
            PagePlan::Keep(set) => set.len(),
            PagePlan::Layout(layout) => layout.len(),
        }
    }
}

/// Shared, read-only state for one job.
#[derive(Clone)]
pub struct StrategyContext {
    pub registry: Arc<ToolRegistry>,
    pub config: Arc<EngineConfig>,
    pub plan: Option<PagePlan>,
}

impl StrategyContext {
    pub fn new(registry: Arc<ToolRegistry>, config: Arc<EngineConfig>) -> Self {
        Self {
            registry,
            config,
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: Option<PagePlan>) -> Self {
        self.plan = plan;
        self
    }

    /// Path of `tool` for use inside `run`, after `check` passed.
    pub fn tool(&self, tool: ToolName) -> Result<PathBuf, StrategyError> {
        self.registry
            .path(tool)
            .map(Path::to_path_buf)
            .ok_or_else(|| StrategyError::Internal(format!("{tool} is not installed")))
    }

    /// Conversion timeout for `job`, honouring its `timeout_secs` option.
    pub fn conversion_timeout(&self, job: &ConversionJob) -> Duration {
        self.config.conversion_timeout_for(job.timeout_secs())
    }

    pub fn plan(&self) -> Result<&PagePlan, StrategyError> {
        self.plan
            .as_ref()
            .ok_or_else(|| StrategyError::Internal("page plan was not resolved".into()))
    }
}

/// What a successful attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File inside the attempt's workspace.
    pub path: PathBuf,
    /// Replaces the default success message when set.
    pub note: Option<String>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// One way to perform an operation.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable identifier reported in results, e.g. `headless-suite`.
    fn name(&self) -> &str;

    /// Whether the strategy can run here. A failed check skips the strategy.
    fn check(&self, job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable>;

    /// Perform the operation, writing into `workspace`, which the caller
    /// owns and removes afterwards.
    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError>;
}

/// The ordered strategy list for `kind`.
pub fn chain_for(kind: OperationKind) -> Vec<Arc<dyn Strategy>> {
    match kind {
        OperationKind::OfficeToPdf
        | OperationKind::SpreadsheetToPdf
        | OperationKind::PresentationToPdf => vec![
            Arc::new(OsNativeAutomation),
            Arc::new(Unoconv),
            Arc::new(HeadlessSuite),
        ],
        OperationKind::TextToPdf => vec![Arc::new(NativeTextRender), Arc::new(HeadlessSuite)],
        OperationKind::ImageToPdf => vec![
            Arc::new(NativeImageEmbed),
            Arc::new(ImageMagick),
            Arc::new(HeadlessSuite),
        ],
        OperationKind::ExtractPages | OperationKind::RemovePages | OperationKind::MergePdfs => {
            vec![Arc::new(PageTool), Arc::new(NativePageCopy)]
        }
        OperationKind::OrganizePages => vec![Arc::new(NativePageCopy)],
        OperationKind::Ocr => vec![Arc::new(OcrPipelineStrategy), Arc::new(OriginalPassthrough)],
    }
}

/// Run blocking, CPU-bound work off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StrategyError>
where
    F: FnOnce() -> Result<T, StrategyError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StrategyError::Internal(format!("Worker task panicked: {e}")))?
}

/// The single PDF that a converter wrote into `dir`, preferring `stem.pdf`.
pub(crate) fn find_pdf_output(dir: &Path, stem: &str) -> Result<PathBuf, StrategyError> {
    let expected = dir.join(format!("{stem}.pdf"));
    if is_non_empty_file(&expected) {
        return Ok(expected);
    }
    let found = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| {
            p.extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
                && is_non_empty_file(p)
        });
    found.ok_or_else(|| StrategyError::MissingArtifact {
        detail: format!("no PDF was written to {}", dir.display()),
    })
}

pub(crate) fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(kind: OperationKind) -> Vec<String> {
        chain_for(kind).iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn chains_are_stable() {
        assert_eq!(
            names(OperationKind::OfficeToPdf),
            ["os-native-automation", "unoconv", "headless-suite"]
        );
        assert_eq!(names(OperationKind::ExtractPages), ["page-tool", "native-page-copy"]);
        assert_eq!(names(OperationKind::OrganizePages), ["native-page-copy"]);
        assert_eq!(names(OperationKind::Ocr), ["ocr-pipeline", "original-passthrough"]);
        for kind in OperationKind::ALL {
            assert!(!chain_for(kind).is_empty(), "{kind} has no chain");
        }
    }

    #[test]
    fn finds_expected_or_any_pdf() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_pdf_output(dir.path(), "report"),
            Err(StrategyError::MissingArtifact { .. })
        ));
        std::fs::write(dir.path().join("other.PDF"), b"%PDF-1.4").unwrap();
        assert_eq!(
            find_pdf_output(dir.path(), "report").unwrap(),
            dir.path().join("other.PDF")
        );
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.4").unwrap();
        assert_eq!(
            find_pdf_output(dir.path(), "report").unwrap(),
            dir.path().join("report.pdf")
        );
    }

    #[test]
    fn empty_files_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"").unwrap();
        assert!(find_pdf_output(dir.path(), "report").is_err());
    }
}
