//! Per-page text recognition.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::OcrOptions;
use crate::error::{PageError, StrategyError};
use crate::exec::ToolCommand;

/// Output of recognising one page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedPage {
    pub page: u32,
    /// `<base>.pdf` or `<base>.txt`, depending on `OcrOptions::text_only`.
    pub path: PathBuf,
}

/// Turns a page image into a searchable PDF page or plain text.
#[async_trait]
pub trait PageRecognizer: Send + Sync {
    /// Recognise `image` (page `page`), writing `<out_base>.pdf|txt`.
    async fn recognize(
        &self,
        image: &Path,
        page: u32,
        options: &OcrOptions,
        out_base: &Path,
    ) -> Result<RecognizedPage, PageError>;
}

/// `tesseract <img> <base> -l <lang> --dpi <dpi> pdf|txt`.
pub struct TesseractRecognizer {
    exe: PathBuf,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(exe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            exe: exe.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PageRecognizer for TesseractRecognizer {
    async fn recognize(
        &self,
        image: &Path,
        page: u32,
        options: &OcrOptions,
        out_base: &Path,
    ) -> Result<RecognizedPage, PageError> {
        let format = if options.text_only { "txt" } else { "pdf" };
        let result = ToolCommand::new(&self.exe, self.timeout)
            .arg(image)
            .arg(out_base)
            .arg("-l")
            .arg(&options.language)
            .arg("--dpi")
            .arg(options.dpi.to_string())
            .arg(format)
            .run()
            .await;

        match result {
            Ok(_) => {}
            Err(StrategyError::Timeout { timeout, .. }) => {
                return Err(PageError::Timeout {
                    page,
                    stage: "recognition".into(),
                    secs: timeout.as_secs(),
                })
            }
            Err(e) => {
                let detail = match &e {
                    StrategyError::NonZeroExit { stderr, .. } if !stderr.trim().is_empty() => {
                        format!("{e}: {}", stderr.trim())
                    }
                    _ => e.to_string(),
                };
                return Err(PageError::RecognizeFailed { page, detail });
            }
        }

        let path = out_base.with_extension(format);
        if !path.is_file() {
            return Err(PageError::RecognizeFailed {
                page,
                detail: format!("tesseract wrote no {format} output"),
            });
        }
        Ok(RecognizedPage { page, path })
    }
}
