//! Office-suite strategies: Microsoft Office over COM (Windows), `unoconv`,
//! and a headless LibreOffice run with a throwaway user profile.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::{find_pdf_output, is_non_empty_file, Artifact, Strategy, StrategyContext};
use crate::error::{StrategyError, ToolUnavailable};
use crate::exec::ToolCommand;
use crate::job::{ConversionJob, OperationKind};
use crate::tools::ToolName;

// ── os-native-automation ─────────────────────────────────────────────────

/// Drives Word, Excel or PowerPoint through PowerShell COM automation.
pub struct OsNativeAutomation;

const AUTOMATION_SCRIPT: &str = r#"param(
    [Parameter(Mandatory=$true)][string]$Kind,
    [Parameter(Mandatory=$true)][string]$InputPath,
    [Parameter(Mandatory=$true)][string]$OutputPath
)
$ErrorActionPreference = 'Stop'
switch ($Kind) {
    'document' {
        $app = New-Object -ComObject Word.Application
        $app.Visible = $false
        $app.DisplayAlerts = 0
        try {
            $doc = $app.Documents.Open($InputPath, $false, $true)
            $doc.ExportAsFixedFormat($OutputPath, 17)
            $doc.Close($false)
        } finally { $app.Quit() }
    }
    'spreadsheet' {
        $app = New-Object -ComObject Excel.Application
        $app.Visible = $false
        $app.DisplayAlerts = $false
        try {
            $book = $app.Workbooks.Open($InputPath, 0, $true)
            $book.ExportAsFixedFormat(0, $OutputPath)
            $book.Close($false)
        } finally { $app.Quit() }
    }
    'presentation' {
        $app = New-Object -ComObject PowerPoint.Application
        try {
            $deck = $app.Presentations.Open($InputPath, $true, $false, $false)
            $deck.SaveAs($OutputPath, 32)
            $deck.Close()
        } finally { $app.Quit() }
    }
}
"#;

fn automation_kind(kind: OperationKind) -> Option<&'static str> {
    match kind {
        OperationKind::OfficeToPdf => Some("document"),
        OperationKind::SpreadsheetToPdf => Some("spreadsheet"),
        OperationKind::PresentationToPdf => Some("presentation"),
        _ => None,
    }
}

#[async_trait]
impl Strategy for OsNativeAutomation {
    fn name(&self) -> &str {
        "os-native-automation"
    }

    fn check(&self, job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        if !cfg!(windows) {
            return Err(ToolUnavailable::new("Office automation is only available on Windows"));
        }
        if automation_kind(job.kind).is_none() {
            return Err(ToolUnavailable::new(format!("{} is not an office conversion", job.kind)));
        }
        ctx.registry.require(ToolName::PowerShell).map(|_| ())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let powershell = ctx.tool(ToolName::PowerShell)?;
        let kind = automation_kind(job.kind)
            .ok_or_else(|| StrategyError::Internal(format!("unsupported kind {}", job.kind)))?;
        let script = workspace.join("convert.ps1");
        tokio::fs::write(&script, AUTOMATION_SCRIPT).await?;
        // COM needs absolute paths.
        let input = std::path::absolute(&job.input_path)?;
        let output = workspace.join("out.pdf");

        ToolCommand::new(powershell, ctx.conversion_timeout(job))
            .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"])
            .arg(&script)
            .arg("-Kind")
            .arg(kind)
            .arg("-InputPath")
            .arg(&input)
            .arg("-OutputPath")
            .arg(&output)
            .run()
            .await?;

        if !is_non_empty_file(&output) {
            return Err(StrategyError::MissingArtifact {
                detail: "Office reported success but wrote no PDF".into(),
            });
        }
        Ok(Artifact::new(output))
    }
}

// ── unoconv ──────────────────────────────────────────────────────────────

/// The `unoconv` script, run through the detected Python interpreter.
pub struct Unoconv;

#[async_trait]
impl Strategy for Unoconv {
    fn name(&self) -> &str {
        "unoconv"
    }

    fn check(&self, _job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        ctx.registry.require(ToolName::Unoconv)?;
        ctx.registry
            .require(ToolName::Python)
            .map(|_| ())
            .map_err(|_| ToolUnavailable::new("unoconv needs a Python interpreter"))
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let python = ctx.tool(ToolName::Python)?;
        let unoconv = ctx.tool(ToolName::Unoconv)?;
        let output = workspace.join("out.pdf");

        ToolCommand::new(python, ctx.conversion_timeout(job))
            .arg(unoconv)
            .args(["-f", "pdf", "-o"])
            .arg(&output)
            .arg(&job.input_path)
            .current_dir(workspace)
            .run()
            .await?;

        if !is_non_empty_file(&output) {
            return Err(StrategyError::MissingArtifact {
                detail: "unoconv exited cleanly but wrote no PDF".into(),
            });
        }
        Ok(Artifact::new(output))
    }
}

// ── headless-suite ───────────────────────────────────────────────────────

/// `soffice --headless --convert-to pdf` with an isolated user profile, so
/// concurrent jobs and a desktop session never share a profile lock.
pub struct HeadlessSuite;

#[async_trait]
impl Strategy for HeadlessSuite {
    fn name(&self) -> &str {
        "headless-suite"
    }

    fn check(&self, job: &ConversionJob, ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        if job.input_count() > 1 {
            return Err(ToolUnavailable::new(
                "soffice converts one input file per run",
            ));
        }
        ctx.registry.require(ToolName::Soffice).map(|_| ())
    }

    async fn run(
        &self,
        job: &ConversionJob,
        ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        let soffice = ctx.tool(ToolName::Soffice)?;
        let profile = workspace.join("profile");
        let outdir = workspace.join("out");
        tokio::fs::create_dir_all(&profile).await?;
        tokio::fs::create_dir_all(&outdir).await?;

        let output = ToolCommand::new(soffice, ctx.conversion_timeout(job))
            .args(["--headless", "--norestore", "--nolockcheck", "--nodefault"])
            .arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(&outdir)
            .arg(&job.input_path)
            .current_dir(workspace)
            .run()
            .await?;
        debug!("soffice: {}", output.stdout.trim());

        let stem = job
            .input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        // soffice exits 0 even when it could not load the source.
        find_pdf_output(&outdir, &stem).map(Artifact::new)
    }
}

/// `file://` URL for a local directory, as soffice expects it.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}
