//! OCR strategies: the full pipeline, and an explicit passthrough for hosts
//! without an OCR engine.

use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

use super::{Artifact, Strategy, StrategyContext};
use crate::error::{StrategyError, ToolUnavailable};
use crate::job::ConversionJob;
use crate::ocr::{is_image_input, raster, OcrOptions, OcrPipeline};
use crate::tools::ToolName;

// ── ocr-pipeline ─────────────────────────────────────────────────────────

pub struct OcrPipelineStrategy;

#[async_trait]
impl Strategy for OcrPipelineStrategy {
    fn name(&self) -> &str {
        "ocr-pipeline"
    }

    fn check(&self, job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        ctx.registry.require(ToolName::Tesseract)?;
        if !is_image_input(&job.input_path) && !raster::any_rasterizer(&ctx.registry) {
            return Err(ToolUnavailable::new(
                "no rasterizer (pdfium, pdftoppm or ghostscript) is installed",
            ));
        }
        Ok(())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let options = OcrOptions::from_job(job, &ctx.config);
        let pipeline = OcrPipeline::new(ctx.registry.clone(), ctx.config.clone())?;
        let output = workspace.join(if options.text_only { "out.txt" } else { "out.pdf" });
        let scratch = workspace.join("scratch");

        let report = pipeline
            .run(&job.input_path, &output, &options, &scratch)
            .await?;

        let artifact = Artifact::new(output);
        if report.fallback_used {
            return Ok(artifact.with_note(
                "OCR recognised no pages; the original input was copied unchanged",
            ));
        }
        if report.page_errors.is_empty() {
            return Ok(artifact.with_note(format!(
                "OCR recognised {} page(s)",
                report.recognized.len()
            )));
        }
        let skipped: Vec<String> = report
            .page_errors
            .iter()
            .map(|e| e.page().to_string())
            .collect();
        Ok(artifact.with_note(format!(
            "OCR recognised {} page(s); skipped page(s) {}",
            report.recognized.len(),
            skipped.join(", ")
        )))
    }
}

// ── original-passthrough ─────────────────────────────────────────────────

/// Copies the input unchanged. Last in the OCR chain so that a host without
/// OCR tools still gets a reported, logged result.
pub struct OriginalPassthrough;

#[async_trait]
impl Strategy for OriginalPassthrough {
    fn name(&self) -> &str {
        "original-passthrough"
    }

    fn check(&self, _job: &ConversionJob, _ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        Ok(())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        _ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        warn!(
            "OCR unavailable; passing {} through unchanged",
            job.input_path.display()
        );
        let name = job
            .input_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "input".into());
        let copy = workspace.join(name);
        tokio::fs::copy(&job.input_path, &copy).await?;
        Ok(Artifact::new(copy).with_note("OCR is unavailable; the original input was copied unchanged"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::job::OperationKind;
    use crate::tools::{ToolBinary, ToolRegistry};
    use std::sync::Arc;

    fn ctx(tools: Vec<ToolBinary>) -> StrategyContext {
        StrategyContext::new(
            Arc::new(ToolRegistry::from_tools(tools)),
            Arc::new(EngineConfig::default()),
        )
    }

    #[test]
    fn pipeline_needs_engine_and_rasterizer() {
        let pdf = ConversionJob::new(OperationKind::Ocr, "scan.pdf", "out.pdf");
        let png = ConversionJob::new(OperationKind::Ocr, "scan.png", "out.pdf");
        let engine_only = ctx(vec![ToolBinary::found(ToolName::Tesseract, "/usr/bin/tesseract", None)]);

        assert!(OcrPipelineStrategy.check(&pdf, &ctx(vec![])).is_err());
        assert!(OcrPipelineStrategy.check(&pdf, &engine_only).is_err());
        assert!(OcrPipelineStrategy.check(&png, &engine_only).is_ok());
    }

    #[tokio::test]
    async fn passthrough_copies_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.pdf");
        std::fs::write(&input, b"%PDF-1.4 scan").unwrap();
        let ws = tempfile::tempdir().unwrap();
        let job = ConversionJob::new(OperationKind::Ocr, &input, dir.path().join("out.pdf"));

        let artifact = OriginalPassthrough
            .run(&job, &ctx(vec![]), ws.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"%PDF-1.4 scan");
        assert!(artifact.note.unwrap().contains("unavailable"));
    }
}
