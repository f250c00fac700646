//! Built-in strategies backed by [`crate::pdf_ops`]. They need no external
//! tool and are always applicable.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{blocking, Artifact, PagePlan, Strategy, StrategyContext};
use crate::error::{StrategyError, ToolUnavailable};
use crate::job::{ConversionJob, OperationKind};
use crate::pdf_ops;

// ── native-text-render ───────────────────────────────────────────────────

pub struct NativeTextRender;

#[async_trait]
impl Strategy for NativeTextRender {
    fn name(&self) -> &str {
        "native-text-render"
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
        let bytes = tokio::fs::read(&job.input_path).await?;
        let text = decode_text(&bytes);
        let metadata = job.metadata();
        let output = workspace.join("out.pdf");
        let target = output.clone();
        blocking(move || {
            let mut doc = pdf_ops::text_to_pdf(&text, metadata.as_ref())?;
            pdf_ops::save_document(&mut doc, &target)?;
            Ok(())
        })
        .await?;
        Ok(Artifact::new(output))
    }
}

/// UTF-8 (with or without BOM) or UTF-16 with BOM; anything else lossy UTF-8.
fn decode_text(bytes: &[u8]) -> String {
    let utf16 = |le: bool| -> String {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| {
                if le {
                    u16::from_le_bytes([c[0], c[1]])
                } else {
                    u16::from_be_bytes([c[0], c[1]])
                }
            })
            .collect();
        String::from_utf16_lossy(&units)
    };
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, ..] => utf16(true),
        [0xFE, 0xFF, ..] => utf16(false),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

// ── native-image-embed ───────────────────────────────────────────────────

pub struct NativeImageEmbed;

#[async_trait]
impl Strategy for NativeImageEmbed {
    fn name(&self) -> &str {
        "native-image-embed"
    }

    fn check(&self, _job: &ConversionJob, _ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        Ok(())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let images: Vec<PathBuf> = job.inputs().map(Path::to_path_buf).collect();
        let dpi = job
            .opt_u64("dpi")
            .map(|d| d.clamp(1, 2400) as u32)
            .unwrap_or(ctx.config.default_image_dpi);
        let metadata = job.metadata();
        let output = workspace.join("out.pdf");
        let target = output.clone();
        let pages = blocking(move || {
            let mut doc = pdf_ops::images_to_pdf(&images, dpi, metadata.as_ref())?;
            pdf_ops::save_document(&mut doc, &target)?;
            Ok(doc.get_pages().len())
        })
        .await?;
        debug!("Embedded {} image page(s) at {} dpi", pages, dpi);
        Ok(Artifact::new(output))
    }
}

// ── native-page-copy ─────────────────────────────────────────────────────

/// Page-object copy over lopdf for extract, remove, merge and organize.
pub struct NativePageCopy;

#[async_trait]
impl Strategy for NativePageCopy {
    fn name(&self) -> &str {
        "native-page-copy"
    }

    fn check(&self, job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        if job.kind.is_page_set_edit() && ctx.plan.is_none() {
            return Err(ToolUnavailable::new("no page plan was resolved for this job"));
        }
        Ok(())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let output = workspace.join("out.pdf");
        let target = output.clone();
        let metadata = job.metadata();
        let input = job.input_path.clone();

        let report = match job.kind {
            OperationKind::MergePdfs => {
                let inputs: Vec<PathBuf> = job.inputs().map(Path::to_path_buf).collect();
                blocking(move || Ok(pdf_ops::merge_files(&inputs, &target, metadata.as_ref())?))
                    .await?
            }
            OperationKind::ExtractPages | OperationKind::RemovePages => {
                let keep = match ctx.plan()? {
                    PagePlan::Keep(set) => set.clone(),
                    PagePlan::Layout(_) => {
                        return Err(StrategyError::Internal("expected a page set".into()))
                    }
                };
                blocking(move || {
                    Ok(pdf_ops::extract_file(&input, &keep, &target, metadata.as_ref())?)
                })
                .await?
            }
            OperationKind::OrganizePages => {
                let layout = ctx
                    .plan()?
                    .layout()
                    .cloned()
                    .ok_or_else(|| StrategyError::Internal("expected a page layout".into()))?;
                blocking(move || {
                    Ok(pdf_ops::organize_file(&input, &layout, &target, metadata.as_ref())?)
                })
                .await?
            }
            other => {
                return Err(StrategyError::Internal(format!(
                    "native-page-copy cannot perform {other}"
                )))
            }
        };

        let artifact = Artifact::new(output);
        if report.failures.is_empty() {
            Ok(artifact)
        } else {
            Ok(artifact.with_note(format!(
                "Copied {} of {} pages; skipped: {}",
                report.copied,
                report.requested,
                report.failures.join("; ")
            )))
        }
    }
}
