//! Final OCR stage: join recognised pages in ascending page order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::recognize::RecognizedPage;
use crate::config::PageSeparator;
use crate::error::StrategyError;
use crate::exec::ToolCommand;
use crate::pdf_ops;
use crate::strategy::blocking;
use crate::tools::{ToolName, ToolRegistry};

/// Concatenate per-page text files, each preceded by its separator.
pub async fn assemble_text(
    pages: &[RecognizedPage],
    separator: &PageSeparator,
    output: &Path,
) -> Result<(), StrategyError> {
    let mut sorted: Vec<&RecognizedPage> = pages.iter().collect();
    sorted.sort_by_key(|p| p.page);

    let mut text = String::new();
    for page in sorted {
        let bytes = tokio::fs::read(&page.path).await?;
        text.push_str(&separator.render(page.page));
        text.push_str(String::from_utf8_lossy(&bytes).trim_end());
    }
    let mut text = text.trim_start().to_string();
    text.push('\n');
    tokio::fs::write(output, text).await?;
    Ok(())
}

/// Merge per-page PDFs in page order: in-process first, then qpdf.
pub async fn assemble_pdf(
    pages: &[RecognizedPage],
    output: &Path,
    registry: &Arc<ToolRegistry>,
    timeout: Duration,
) -> Result<(), StrategyError> {
    let mut sorted: Vec<&RecognizedPage> = pages.iter().collect();
    sorted.sort_by_key(|p| p.page);
    let fragments: Vec<PathBuf> = sorted.iter().map(|p| p.path.clone()).collect();

    let inputs = fragments.clone();
    let target = output.to_path_buf();
    let merged = blocking(move || Ok(pdf_ops::merge_files(&inputs, &target, None)?)).await;
    let err = match merged {
        Ok(report) => {
            debug!("Merged {} OCR page(s) in-process", report.copied);
            return Ok(());
        }
        Err(e) => e,
    };

    let Some(qpdf) = registry.path(ToolName::Qpdf) else {
        return Err(err);
    };
    warn!("In-process merge of OCR pages failed ({}), retrying with qpdf", err);
    ToolCommand::new(qpdf, timeout)
        .args(["--empty", "--pages"])
        .args(&fragments)
        .arg("--")
        .arg(output)
        .run()
        .await?;
    Ok(())
}
