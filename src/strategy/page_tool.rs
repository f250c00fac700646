//! `page-tool`: extract, remove and merge through `qpdf`.
//!
//! Removal is handed to qpdf as the keep-set range string, since qpdf only
//! understands inclusion lists.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use super::{blocking, is_non_empty_file, Artifact, PagePlan, Strategy, StrategyContext};
use crate::error::{StrategyError, ToolUnavailable};
use crate::exec::ToolCommand;
use crate::job::{ConversionJob, OperationKind};
use crate::pdf_ops;
use crate::tools::{ToolName, ToolRegistry};

/// qpdf exits with 3 when it succeeded but printed warnings.
const QPDF_EXIT_WARNINGS: i32 = 3;

pub struct PageTool;

#[async_trait]
impl Strategy for PageTool {
    fn name(&self) -> &str {
        "page-tool"
    }

    fn check(&self, job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        match job.kind {
            OperationKind::ExtractPages | OperationKind::RemovePages => {
                if ctx.plan.as_ref().and_then(PagePlan::keep).is_none() {
                    return Err(ToolUnavailable::new("no page set was resolved for this job"));
                }
            }
            OperationKind::MergePdfs => {}
            other => {
                return Err(ToolUnavailable::new(format!("qpdf is not used for {other}")));
            }
        }
        ctx.registry.require(ToolName::Qpdf).map(|_| ())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let qpdf = ctx.tool(ToolName::Qpdf)?;
        let output = workspace.join("out.pdf");
        let mut cmd = ToolCommand::new(qpdf, ctx.config.page_tool_timeout);

        cmd = match job.kind {
            OperationKind::MergePdfs => cmd
                .args(["--empty", "--pages"])
                .args(job.inputs())
                .arg("--")
                .arg(&output),
            _ => {
                let keep = ctx
                    .plan()?
                    .keep()
                    .ok_or_else(|| StrategyError::Internal("expected a page set".into()))?;
                cmd.arg(&job.input_path)
                    .arg("--pages")
                    .arg(&job.input_path)
                    .arg(keep.to_range_string())
                    .arg("--")
                    .arg(&output)
            }
        };

        let label = cmd.label();
        let out = cmd.output().await?;
        match out.code {
            Some(0) => {}
            Some(QPDF_EXIT_WARNINGS) => {
                warn!("qpdf completed with warnings: {}", out.stderr.trim());
            }
            code => {
                return Err(StrategyError::NonZeroExit {
                    program: label,
                    code,
                    stderr: out.stderr,
                })
            }
        }
        if !is_non_empty_file(&output) {
            return Err(StrategyError::MissingArtifact {
                detail: "qpdf wrote no output".into(),
            });
        }

        if let Some(meta) = job.metadata() {
            let target = output.clone();
            blocking(move || Ok(pdf_ops::set_metadata_file(&target, &meta)?)).await?;
            debug!("Applied document metadata to qpdf output");
        }
        Ok(Artifact::new(output))
    }
}

/// Page count via `qpdf --show-npages`, used when lopdf cannot parse the file.
pub async fn qpdf_page_count(
    qpdf: &Path,
    input: &Path,
    timeout: std::time::Duration,
) -> Result<u32, StrategyError> {
    let out = ToolCommand::new(qpdf, timeout)
        .arg("--show-npages")
        .arg(input)
        .run()
        .await?;
    out.stdout
        .trim()
        .parse()
        .map_err(|_| StrategyError::MissingArtifact {
            detail: format!("unexpected qpdf page count '{}'", out.stdout.trim()),
        })
}

/// Page count via lopdf, then `qpdf --show-npages`. The error explains
/// why neither worked.
pub async fn resolve_page_count(
    input: &Path,
    registry: &ToolRegistry,
    timeout: std::time::Duration,
) -> Result<u32, String> {
    let path = input.to_path_buf();
    let parsed = tokio::task::spawn_blocking(move || pdf_ops::page_count(&path)).await;
    let lopdf_detail = match parsed {
        Ok(Ok(n)) if n > 0 => return Ok(n),
        Ok(Ok(_)) => "no pages found".to_string(),
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("page count task failed: {e}"),
    };
    debug!("lopdf could not count pages of {}: {}", input.display(), lopdf_detail);

    let Some(qpdf) = registry.path(ToolName::Qpdf) else {
        return Err(lopdf_detail);
    };
    match qpdf_page_count(qpdf, input, timeout).await {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err("qpdf reported no pages".into()),
        Err(e) => Err(format!("{lopdf_detail}; qpdf: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::page_range::PageSet;
    use crate::tools::{ToolBinary, ToolRegistry};
    use std::sync::Arc;

    #[test]
    fn applies_to_page_set_kinds_only() {
        let ctx = StrategyContext::new(
            Arc::new(ToolRegistry::from_tools([ToolBinary::found(
                ToolName::Qpdf,
                "/usr/bin/qpdf",
                None,
            )])),
            Arc::new(EngineConfig::default()),
        )
        .with_plan(Some(PagePlan::Keep(PageSet::parse("1-2", 4))));

        let extract = ConversionJob::new(OperationKind::ExtractPages, "a.pdf", "b.pdf");
        assert!(PageTool.check(&extract, &ctx).is_ok());
        let organize = ConversionJob::new(OperationKind::OrganizePages, "a.pdf", "b.pdf");
        assert!(PageTool.check(&organize, &ctx).is_err());

        let no_tool = StrategyContext::new(
            Arc::new(ToolRegistry::empty()),
            Arc::new(EngineConfig::default()),
        );
        let merge = ConversionJob::new(OperationKind::MergePdfs, "a.pdf", "b.pdf");
        assert!(PageTool.check(&merge, &no_tool).is_err());
    }
}
