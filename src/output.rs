//! Result types returned to the caller of [`crate::Orchestrator::process`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{ConvertError, ErrorKind};

/// One executed strategy attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub strategy: String,
    pub succeeded: bool,
    /// Human-readable summary of what happened.
    pub message: String,
    /// Artifact produced in the attempt's workspace, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub produced_path: Option<PathBuf>,
    pub duration_ms: u64,
    /// Raw details (stderr, exit code) kept out of `message`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diagnostics: BTreeMap<String, String>,
}

/// A strategy whose precondition did not hold. It was never run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStrategy {
    pub strategy: String,
    pub reason: String,
}

/// The outcome of a job. Always produced, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    pub message: String,
    /// The job's output path, set only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<String>,
    /// Failed attempts in execution order.
    pub attempts: Vec<StrategyOutcome>,
    pub skipped: Vec<SkippedStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

impl ConversionResult {
    pub fn succeeded(
        output_path: PathBuf,
        strategy: impl Into<String>,
        message: impl Into<String>,
        attempts: Vec<StrategyOutcome>,
        skipped: Vec<SkippedStrategy>,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            output_path: Some(output_path),
            strategy_used: Some(strategy.into()),
            attempts,
            skipped,
            error_kind: None,
            duration_ms: 0,
        }
    }

    pub fn failed(
        error: &ConvertError,
        attempts: Vec<StrategyOutcome>,
        skipped: Vec<SkippedStrategy>,
    ) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            output_path: None,
            strategy_used: None,
            attempts,
            skipped,
            error_kind: Some(error.kind()),
            duration_ms: 0,
        }
    }

    pub(crate) fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// Last failed attempt, usually the most informative one.
    pub fn last_attempt(&self) -> Option<&StrategyOutcome> {
        self.attempts.last()
    }
}

impl fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "{} (via {}, {} ms)",
                self.message,
                self.strategy_used.as_deref().unwrap_or("?"),
                self.duration_ms
            )?;
        } else {
            write!(f, "Failed: {}", self.message)?;
        }
        for a in &self.attempts {
            write!(f, "\n  ✗ {}: {}", a.strategy, a.message)?;
        }
        for s in &self.skipped {
            write!(f, "\n  - {} skipped: {}", s.strategy, s.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OperationKind;

    #[test]
    fn failed_result_carries_kind_and_message() {
        let err = ConvertError::Exhausted {
            kind: OperationKind::MergePdfs,
            attempts: 0,
        };
        let r = ConversionResult::failed(&err, vec![], vec![]);
        assert!(!r.success);
        assert_eq!(r.error_kind, Some(ErrorKind::Exhausted));
        assert!(r.output_path.is_none());
        assert!(r.message.contains("merge-pdfs"));
    }

    #[test]
    fn json_omits_empty_fields() {
        let r = ConversionResult::succeeded(
            PathBuf::from("/tmp/out.pdf"),
            "native-page-copy",
            "Extracted 2 pages",
            vec![],
            vec![SkippedStrategy {
                strategy: "page-tool".into(),
                reason: "qpdf is not installed".into(),
            }],
        )
        .with_duration_ms(12);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["strategy_used"], "native-page-copy");
        assert!(v.get("error_kind").is_none());
        assert_eq!(v["skipped"][0]["strategy"], "page-tool");
        assert!(r.to_string().contains("page-tool skipped"));
    }
}
