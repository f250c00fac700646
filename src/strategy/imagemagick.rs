//! `imagemagick`: `magick <images…> out.pdf` (or `convert` on ImageMagick 6).

use async_trait::async_trait;
use std::path::Path;

use super::{is_non_empty_file, Artifact, Strategy, StrategyContext};
use crate::error::{StrategyError, ToolUnavailable};
use crate::exec::ToolCommand;
use crate::job::ConversionJob;
use crate::tools::ToolName;

pub struct ImageMagick;

#[async_trait]
impl Strategy for ImageMagick {
    fn name(&self) -> &str {
        "imagemagick"
    }

    fn check(&self, _job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        ctx.registry.require(ToolName::ImageMagick).map(|_| ())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let magick = ctx.tool(ToolName::ImageMagick)?;
        let output = workspace.join("out.pdf");
        let mut cmd = ToolCommand::new(magick, ctx.conversion_timeout(job)).args(job.inputs());
        if let Some(dpi) = job.opt_u64("dpi") {
            cmd = cmd.arg("-density").arg(dpi.to_string());
        }
        cmd.arg(&output).current_dir(workspace).run().await?;

        if !is_non_empty_file(&output) {
            return Err(StrategyError::MissingArtifact {
                detail: "ImageMagick wrote no PDF".into(),
            });
        }
        Ok(Artifact::new(output))
    }
}
