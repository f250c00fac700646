//! The job runner: validate, plan pages, walk the strategy chain.
//!
//! ```text
//! ConversionJob
//!   │  validate inputs            ── InputError ──────┐
//!   │  resolve page plan          ── PageRangeError ──┤
//!   │  filter chain by check()    → skipped            │
//!   ▼                                                  ▼
//! strategy 1 ─✗─► strategy 2 ─✗─► … ─✓─► copy to output   ConversionResult
//! ```
//!
//! Every attempt runs in its own [`tempfile::TempDir`]. A failed attempt is
//! recorded and the next strategy runs; the first success wins. Nothing in
//! here returns `Err`: every outcome, including panics inside a strategy,
//! ends up in the returned [`ConversionResult`].

use futures::FutureExt;
use std::collections::BTreeMap;
use std::io::Read;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ConvertError, InputError, PageRangeError, StrategyError};
use crate::job::{extension_of, ConversionJob, OperationKind};
use crate::output::{ConversionResult, SkippedStrategy, StrategyOutcome};
use crate::page_range::{PageLayout, PageSet};
use crate::strategy::page_tool::resolve_page_count;
use crate::strategy::{chain_for, Artifact, PagePlan, Strategy, StrategyContext};
use crate::tools::ToolRegistry;

/// Runs jobs against a tool registry. Cheap to clone and share.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    config: Arc<EngineConfig>,
}

impl Orchestrator {
    /// Orchestrator over the process-wide [`ToolRegistry::shared`] snapshot.
    pub async fn new(config: EngineConfig) -> Self {
        let registry = ToolRegistry::shared(&config).await;
        Self::with_registry(registry, config)
    }

    /// Orchestrator over an explicit registry, e.g. one built with
    /// [`ToolRegistry::from_tools`].
    pub fn with_registry(registry: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `job` through the chain for its kind.
    pub async fn process(&self, job: &ConversionJob) -> ConversionResult {
        self.process_with_chain(job, chain_for(job.kind)).await
    }

    /// Run `job` through an explicit chain instead of the built-in one.
    pub async fn process_with_chain(
        &self,
        job: &ConversionJob,
        chain: Vec<Arc<dyn Strategy>>,
    ) -> ConversionResult {
        let start = Instant::now();
        info!(
            "Job {}: {} → {}",
            job.kind,
            job.input_path.display(),
            job.output_path.display()
        );

        let result = match self.prepare(job).await {
            Ok((job, ctx)) => self.run_chain(&job, &ctx, chain).await,
            Err(e) => {
                warn!("Job {} rejected: {}", job.kind, e);
                ConversionResult::failed(&e, Vec::new(), Vec::new())
            }
        };
        let result = result.with_duration_ms(start.elapsed().as_millis() as u64);

        if result.success {
            info!(
                "Job {} done via {} in {}ms",
                job.kind,
                result.strategy_used.as_deref().unwrap_or("?"),
                result.duration_ms
            );
        } else {
            warn!("Job {} failed: {}", job.kind, result.message);
        }
        result
    }

    /// Synchronous wrapper around [`Orchestrator::process`].
    ///
    /// Creates a private tokio runtime, so it must not be called from
    /// inside an async context.
    pub fn process_blocking(&self, job: &ConversionJob) -> ConversionResult {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.process(job)),
            Err(e) => ConversionResult::failed(
                &ConvertError::Internal(format!("Failed to create tokio runtime: {e}")),
                Vec::new(),
                Vec::new(),
            ),
        }
    }

    // ── Preparation ──────────────────────────────────────────────────────

    /// Validate, resolve paths and plan pages. The returned job carries
    /// absolute paths; external tools run inside the attempt workspace.
    async fn prepare(
        &self,
        job: &ConversionJob,
    ) -> Result<(ConversionJob, StrategyContext), ConvertError> {
        validate_inputs(job)?;
        let job = with_absolute_paths(job).map_err(|e| {
            ConvertError::Internal(format!("Cannot resolve job paths: {e}"))
        })?;
        let plan = self.resolve_plan(&job).await?;
        if let Some(plan) = &plan {
            debug!("Page plan for {}: {} output page(s)", job.kind, plan.output_len());
        }
        let ctx = StrategyContext::new(self.registry.clone(), self.config.clone()).with_plan(plan);
        Ok((job, ctx))
    }

    async fn resolve_plan(&self, job: &ConversionJob) -> Result<Option<PagePlan>, ConvertError> {
        if !job.kind.is_page_set_edit() {
            return Ok(None);
        }
        let total = resolve_page_count(&job.input_path, &self.registry, self.config.page_tool_timeout)
            .await
            .map_err(|detail| PageRangeError::UnknownPageCount {
                path: job.input_path.clone(),
                detail,
            })?;

        let plan = match job.kind {
            OperationKind::ExtractPages => {
                let spec = job.pages_spec().ok_or(PageRangeError::Missing)?;
                let set = PageSet::parse(&spec, total);
                if set.is_empty() {
                    return Err(PageRangeError::Empty { spec, total }.into());
                }
                PagePlan::Keep(set)
            }
            OperationKind::RemovePages => {
                let spec = job.pages_spec().ok_or(PageRangeError::Missing)?;
                PagePlan::Keep(PageSet::pages_to_keep_after_removing(&spec, total)?)
            }
            OperationKind::OrganizePages => {
                let spec = job
                    .layout_spec()
                    .or_else(|| job.pages_spec())
                    .ok_or(PageRangeError::Missing)?;
                PagePlan::Layout(PageLayout::parse(&spec, total)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(plan))
    }

    // ── Chain execution ──────────────────────────────────────────────────

    async fn run_chain(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        chain: Vec<Arc<dyn Strategy>>,
    ) -> ConversionResult {
        let mut skipped = Vec::new();
        let mut runnable = Vec::new();
        for strategy in chain {
            match strategy.check(job, ctx) {
                Ok(()) => runnable.push(strategy),
                Err(e) => {
                    debug!("Skipping {}: {}", strategy.name(), e.reason);
                    skipped.push(SkippedStrategy {
                        strategy: strategy.name().to_string(),
                        reason: e.reason,
                    });
                }
            }
        }
        if runnable.is_empty() {
            warn!("No strategy is available for {}", job.kind);
        }

        let mut attempts = Vec::new();
        for strategy in runnable {
            let outcome = self.attempt(strategy.as_ref(), job, ctx).await;
            if outcome.succeeded {
                return ConversionResult::succeeded(
                    job.output_path.clone(),
                    outcome.strategy,
                    outcome.message,
                    attempts,
                    skipped,
                );
            }
            attempts.push(outcome);
        }

        let error = ConvertError::Exhausted {
            kind: job.kind,
            attempts: attempts.len(),
        };
        ConversionResult::failed(&error, attempts, skipped)
    }

    /// One strategy in a fresh workspace, including the copy to the job's
    /// output path.
    async fn attempt(
        &self,
        strategy: &dyn Strategy,
        job: &ConversionJob,
        ctx: &StrategyContext,
    ) -> StrategyOutcome {
        let name = strategy.name().to_string();
        let started = Instant::now();
        info!("Trying {} for {}", name, job.kind);

        let result = match self.workspace() {
            Ok(workspace) => {
                let run = AssertUnwindSafe(strategy.run(job, ctx, workspace.path()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(StrategyError::Internal(format!("{name} panicked")))
                    });
                match run {
                    Ok(artifact) => publish(&artifact, &job.output_path)
                        .await
                        .map(|()| artifact),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(StrategyError::Io(e)),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(artifact) => StrategyOutcome {
                strategy: name,
                succeeded: true,
                message: artifact
                    .note
                    .unwrap_or_else(|| success_message(job, ctx)),
                produced_path: Some(artifact.path),
                duration_ms,
                diagnostics: BTreeMap::new(),
            },
            Err(e) => {
                warn!("{} failed after {}ms: {}", name, duration_ms, e);
                StrategyOutcome {
                    strategy: name,
                    succeeded: false,
                    message: e.to_string(),
                    produced_path: None,
                    duration_ms,
                    diagnostics: e.diagnostics(),
                }
            }
        }
    }

    fn workspace(&self) -> std::io::Result<tempfile::TempDir> {
        let dir = tempfile::Builder::new()
            .prefix("pdfsmith-")
            .keep(self.config.keep_workspaces)
            .tempdir()?;
        if self.config.keep_workspaces {
            debug!("Keeping workspace {}", dir.path().display());
        }
        Ok(dir)
    }
}

fn success_message(job: &ConversionJob, ctx: &StrategyContext) -> String {
    let pages = ctx.plan.as_ref().map(PagePlan::output_len);
    match (job.kind, pages) {
        (OperationKind::ExtractPages, Some(n)) => format!("Extracted {n} page(s)"),
        (OperationKind::RemovePages, Some(n)) => format!("Removed pages; {n} page(s) remain"),
        (OperationKind::OrganizePages, Some(n)) => format!("Organized into {n} page(s)"),
        (OperationKind::MergePdfs, _) => format!("Merged {} PDF files", job.input_count()),
        (OperationKind::Ocr, _) => "OCR completed".to_string(),
        (kind, _) => format!("Converted {} ({kind})", file_label(&job.input_path)),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn with_absolute_paths(job: &ConversionJob) -> std::io::Result<ConversionJob> {
    let mut job = job.clone();
    job.input_path = std::path::absolute(&job.input_path)?;
    for path in &mut job.additional_inputs {
        *path = std::path::absolute(&*path)?;
    }
    job.output_path = std::path::absolute(&job.output_path)?;
    Ok(job)
}

// ── Input validation ─────────────────────────────────────────────────────

/// Check every input before any strategy runs.
fn validate_inputs(job: &ConversionJob) -> Result<(), InputError> {
    if job.kind == OperationKind::MergePdfs && job.input_count() < 2 {
        return Err(InputError::MissingInput {
            kind: job.kind,
            needed: 2,
            got: job.input_count(),
        });
    }
    if !job.kind.accepts_multiple_inputs() && job.input_count() > 1 {
        return Err(InputError::TooManyInputs {
            kind: job.kind,
            got: job.input_count(),
        });
    }
    for path in job.inputs() {
        validate_input(job.kind, path)?;
    }
    Ok(())
}

fn validate_input(kind: OperationKind, path: &Path) -> Result<(), InputError> {
    let owned = || path.to_path_buf();
    let meta = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(InputError::FileNotFound { path: owned() }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InputError::PermissionDenied { path: owned() })
        }
        Err(_) => return Err(InputError::FileNotFound { path: owned() }),
    };

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InputError::PermissionDenied { path: owned() })
        }
        Err(_) => return Err(InputError::FileNotFound { path: owned() }),
    };
    if meta.len() == 0 {
        return Err(InputError::Empty { path: owned() });
    }

    let extension = extension_of(path);
    let must_be_pdf = kind.requires_pdf_input() || (kind == OperationKind::Ocr && extension == "pdf");
    if must_be_pdf {
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
            return Err(InputError::NotAPdf {
                path: owned(),
                magic,
            });
        }
    } else if !kind.accepted_extensions().contains(&extension.as_str()) {
        return Err(InputError::UnsupportedFormat { kind, extension });
    }

    debug!("Validated input {}", path.display());
    Ok(())
}

/// Copy `artifact` to `output` via a sibling temp file and a rename, so a
/// reader never sees a partial file.
async fn publish(artifact: &Artifact, output: &Path) -> Result<(), StrategyError> {
    if !tokio::fs::try_exists(&artifact.path).await.unwrap_or(false) {
        return Err(StrategyError::MissingArtifact {
            detail: format!("{} does not exist", artifact.path.display()),
        });
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = staging_path(output);
    if let Err(e) = tokio::fs::copy(&artifact.path, &tmp).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, output).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!("Wrote {}", output.display());
    Ok(())
}

fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    output.with_file_name(format!(".{name}.pdfsmith-partial"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn merge_needs_two_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        std::fs::write(&a, b"%PDF-1.4").unwrap();
        let job = ConversionJob::new(OperationKind::MergePdfs, &a, dir.path().join("out.pdf"));
        assert!(matches!(
            validate_inputs(&job),
            Err(InputError::MissingInput { needed: 2, got: 1, .. })
        ));
    }

    #[test]
    fn single_input_kinds_reject_extra_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.docx");
        let b = dir.path().join("b.docx");
        std::fs::write(&a, b"PK\x03\x04").unwrap();
        std::fs::write(&b, b"PK\x03\x04").unwrap();
        let job = ConversionJob::new(OperationKind::OfficeToPdf, &a, dir.path().join("out.pdf"))
            .with_input(&b);
        assert!(matches!(
            validate_inputs(&job),
            Err(InputError::TooManyInputs { got: 2, .. })
        ));

        let one = dir.path().join("one.png");
        let two = dir.path().join("two.png");
        std::fs::write(&one, b"\x89PNG").unwrap();
        std::fs::write(&two, b"\x89PNG").unwrap();
        let images = ConversionJob::new(OperationKind::ImageToPdf, &one, dir.path().join("out.pdf"))
            .with_input(&two);
        assert!(validate_inputs(&images).is_ok());
    }

    #[test]
    fn job_paths_become_absolute() {
        let job = ConversionJob::new(OperationKind::OfficeToPdf, "letter.docx", "out/letter.pdf")
            .with_input("more.docx");
        let resolved = with_absolute_paths(&job).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(resolved.input_path, cwd.join("letter.docx"));
        assert_eq!(resolved.additional_inputs, vec![cwd.join("more.docx")]);
        assert_eq!(resolved.output_path, cwd.join("out/letter.pdf"));
    }

    #[test]
    fn input_checks() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");
        let empty = dir.path().join("empty.docx");
        let fake_pdf = dir.path().join("fake.pdf");
        let notes = dir.path().join("notes.xyz");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&fake_pdf, b"PK\x03\x04zip").unwrap();
        std::fs::write(&notes, b"hello").unwrap();

        assert!(matches!(
            validate_input(OperationKind::ExtractPages, &missing),
            Err(InputError::FileNotFound { .. })
        ));
        assert!(matches!(
            validate_input(OperationKind::OfficeToPdf, &empty),
            Err(InputError::Empty { .. })
        ));
        assert!(matches!(
            validate_input(OperationKind::ExtractPages, &fake_pdf),
            Err(InputError::NotAPdf { magic, .. }) if &magic == b"PK\x03\x04"
        ));
        assert!(matches!(
            validate_input(OperationKind::Ocr, &fake_pdf),
            Err(InputError::NotAPdf { .. })
        ));
        assert!(matches!(
            validate_input(OperationKind::TextToPdf, &notes),
            Err(InputError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn directories_are_not_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_input(OperationKind::ImageToPdf, dir.path()),
            Err(InputError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn publish_creates_parents_and_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("artifact.pdf");
        std::fs::write(&artifact, b"%PDF-1.7").unwrap();
        let output = dir.path().join("a/b/out.pdf");

        publish(&Artifact::new(&artifact), &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.7");
        assert!(!staging_path(&output).exists());
    }

    #[tokio::test]
    async fn missing_artifact_fails_publish() {
        let dir = tempfile::tempdir().unwrap();
        let err = publish(&Artifact::new(dir.path().join("nope.pdf")), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::MissingArtifact { .. }));
    }

    #[tokio::test]
    async fn rejected_job_has_no_attempts() {
        let orch = Orchestrator::with_registry(
            Arc::new(ToolRegistry::empty()),
            EngineConfig::default(),
        );
        let job = ConversionJob::new(OperationKind::OfficeToPdf, "/nonexistent/report.docx", "/tmp/out.pdf");
        let r = orch.process(&job).await;
        assert!(!r.success);
        assert_eq!(r.error_kind, Some(ErrorKind::Input));
        assert!(r.attempts.is_empty());
        assert!(r.skipped.is_empty());
    }
}
