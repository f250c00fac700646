//! Strategy chain behaviour with scripted strategies.

use async_trait::async_trait;
use pdfsmith::{
    Artifact, ConversionJob, ConversionResult, EngineConfig, ErrorKind, OperationKind,
    Orchestrator, Strategy, StrategyContext, StrategyError, ToolRegistry, ToolUnavailable,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy)]
enum Script {
    Succeed,
    Fail,
    Unavailable,
    Panic,
    /// Claims success but produces nothing.
    Phantom,
}

struct Scripted {
    name: &'static str,
    script: Script,
    workspaces: Arc<Mutex<Vec<PathBuf>>>,
}

impl Scripted {
    fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            workspaces: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl Strategy for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self, _job: &ConversionJob, _ctx: &StrategyContext) -> Result<(), ToolUnavailable> {
        match self.script {
            Script::Unavailable => Err(ToolUnavailable::new("fake-tool is not installed")),
            _ => Ok(()),
        }
    }

    async fn run(
        &self,
        _job: &ConversionJob,
        _ctx: &StrategyContext,
        workspace: &Path,
    ) -> Result<Artifact, StrategyError> {
        self.workspaces.lock().unwrap().push(workspace.to_path_buf());
        match self.script {
            Script::Succeed => {
                let out = workspace.join("out.pdf");
                tokio::fs::write(&out, format!("%PDF-1.7 from {}", self.name)).await?;
                Ok(Artifact::new(out))
            }
            Script::Fail => Err(StrategyError::NonZeroExit {
                program: self.name.to_string(),
                code: Some(77),
                stderr: format!("{} exploded\n", self.name),
            }),
            Script::Panic => panic!("{} panicked", self.name),
            Script::Phantom => Ok(Artifact::new(workspace.join("never-written.pdf"))),
            Script::Unavailable => unreachable!("unavailable strategies are never run"),
        }
    }
}

fn chain(items: &[Arc<Scripted>]) -> Vec<Arc<dyn Strategy>> {
    items.iter().map(|s| s.clone() as Arc<dyn Strategy>).collect()
}

fn engine(config: EngineConfig) -> Orchestrator {
    Orchestrator::with_registry(Arc::new(ToolRegistry::empty()), config)
}

/// A valid text job in a fresh directory.
fn text_job(dir: &Path) -> ConversionJob {
    let input = dir.join("notes.txt");
    std::fs::write(&input, "hello").unwrap();
    ConversionJob::new(OperationKind::TextToPdf, input, dir.join("out/notes.pdf"))
}

async fn run(items: &[Arc<Scripted>], job: &ConversionJob) -> ConversionResult {
    engine(EngineConfig::default())
        .process_with_chain(job, chain(items))
        .await
}

#[tokio::test]
async fn third_strategy_wins_after_two_failures() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let items = [
        Scripted::new("first", Script::Fail),
        Scripted::new("second", Script::Fail),
        Scripted::new("third", Script::Succeed),
    ];

    let result = run(&items, &job).await;
    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("third"));
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].strategy, "first");
    assert_eq!(result.attempts[1].strategy, "second");
    assert_eq!(result.output_path.as_deref(), Some(job.output_path.as_path()));
    assert_eq!(
        std::fs::read_to_string(&job.output_path).unwrap(),
        "%PDF-1.7 from third"
    );
}

#[tokio::test]
async fn all_failing_is_exhausted_with_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let items = [
        Scripted::new("first", Script::Fail),
        Scripted::new("second", Script::Fail),
        Scripted::new("third", Script::Fail),
    ];

    let result = run(&items, &job).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Exhausted));
    assert_eq!(result.attempts.len(), 3);
    assert!(result.output_path.is_none());
    assert!(!job.output_path.exists());

    let last = result.last_attempt().unwrap();
    assert!(!last.succeeded);
    assert_eq!(last.diagnostics.get("exit_code").map(String::as_str), Some("77"));
    assert!(last.diagnostics["stderr"].contains("third exploded"));
    assert!(!last.message.contains("exploded"));
}

#[tokio::test]
async fn unavailable_strategies_are_skipped_not_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let items = [
        Scripted::new("missing", Script::Unavailable),
        Scripted::new("works", Script::Succeed),
    ];

    let result = run(&items, &job).await;
    assert!(result.success);
    assert!(result.attempts.is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].strategy, "missing");
    assert!(result.skipped[0].reason.contains("not installed"));
}

#[tokio::test]
async fn nothing_applicable_is_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let result = run(&[Scripted::new("missing", Script::Unavailable)], &job).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Exhausted));
    assert!(result.attempts.is_empty());
    assert_eq!(result.skipped.len(), 1);
}

#[tokio::test]
async fn panicking_strategy_is_a_failed_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let items = [
        Scripted::new("boom", Script::Panic),
        Scripted::new("works", Script::Succeed),
    ];

    let result = run(&items, &job).await;
    assert!(result.success);
    assert_eq!(result.attempts.len(), 1);
    assert!(result.attempts[0].message.contains("panicked"));
}

#[tokio::test]
async fn missing_artifact_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let items = [
        Scripted::new("phantom", Script::Phantom),
        Scripted::new("works", Script::Succeed),
    ];

    let result = run(&items, &job).await;
    assert_eq!(result.strategy_used.as_deref(), Some("works"));
    assert_eq!(result.attempts[0].strategy, "phantom");
}

#[tokio::test]
async fn each_attempt_gets_its_own_workspace_which_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let failing = Scripted::new("first", Script::Fail);
    let working = Scripted::new("second", Script::Succeed);

    let result = run(&[failing.clone(), working.clone()], &job).await;
    assert!(result.success);
    let a = failing.workspaces.lock().unwrap()[0].clone();
    let b = working.workspaces.lock().unwrap()[0].clone();
    assert_ne!(a, b);
    assert!(!a.exists());
    assert!(!b.exists());
}

#[tokio::test]
async fn workspaces_survive_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let working = Scripted::new("works", Script::Succeed);
    let config = EngineConfig::builder().keep_workspaces(true).build().unwrap();

    let result = engine(config)
        .process_with_chain(&job, chain(&[working.clone()]))
        .await;
    assert!(result.success);
    let ws = working.workspaces.lock().unwrap()[0].clone();
    assert!(ws.join("out.pdf").exists());
    std::fs::remove_dir_all(ws).unwrap();
}

#[tokio::test]
async fn invalid_input_never_reaches_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let job = ConversionJob::new(
        OperationKind::TextToPdf,
        dir.path().join("absent.txt"),
        dir.path().join("out.pdf"),
    );
    let working = Scripted::new("works", Script::Succeed);

    let result = run(&[working.clone()], &job).await;
    assert_eq!(result.error_kind, Some(ErrorKind::Input));
    assert!(working.workspaces.lock().unwrap().is_empty());
}

#[test]
fn blocking_wrapper_runs_the_builtin_chain() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let result = engine(EngineConfig::default()).process_blocking(&job);
    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("native-text-render"));
    assert!(job.output_path.exists());
}

#[tokio::test]
async fn result_serializes_for_callers() {
    let dir = tempfile::tempdir().unwrap();
    let job = text_job(dir.path());
    let result = run(&[Scripted::new("only", Script::Fail)], &job).await;
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["success"], false);
    assert_eq!(value["error_kind"], "exhausted");
    assert_eq!(value["attempts"][0]["strategy"], "only");
    assert_eq!(value["attempts"][0]["diagnostics"]["program"], "only");
}

/// Stand-in for soffice: writes `<outdir>/<stem>.pdf` only when the source
/// path it was handed resolves from its own working directory.
#[cfg(unix)]
const FAKE_SOFFICE: &str = r#"#!/bin/sh
outdir=""
while [ $# -gt 1 ]; do
  if [ "$1" = "--outdir" ]; then outdir="$2"; shift; fi
  shift
done
[ -f "$1" ] || { echo "source file could not be loaded" >&2; exit 0; }
name=$(basename "$1")
printf '%%PDF-1.4 converted\n' > "$outdir/${name%.*}.pdf"
"#;

#[cfg(unix)]
#[tokio::test]
async fn relative_input_reaches_the_office_suite() {
    use pdfsmith::{ToolBinary, ToolName};
    use std::os::unix::fs::PermissionsExt;

    let tools = tempfile::tempdir().unwrap();
    let soffice = tools.path().join("soffice");
    std::fs::write(&soffice, FAKE_SOFFICE).unwrap();
    std::fs::set_permissions(&soffice, std::fs::Permissions::from_mode(0o755)).unwrap();

    // Created under the current directory so the job paths stay relative.
    let dir = tempfile::tempdir_in(".").unwrap();
    let input = dir.path().join("letter.docx");
    std::fs::write(&input, b"PK\x03\x04docx").unwrap();
    assert!(input.is_relative());
    let job = ConversionJob::new(OperationKind::OfficeToPdf, &input, dir.path().join("letter.pdf"));

    let registry = ToolRegistry::from_tools([ToolBinary::found(ToolName::Soffice, &soffice, None)]);
    let result = Orchestrator::with_registry(Arc::new(registry), EngineConfig::default())
        .process(&job)
        .await;

    assert!(result.success, "{result}");
    assert_eq!(result.strategy_used.as_deref(), Some("headless-suite"));
    assert!(result.output_path.as_deref().is_some_and(Path::is_absolute));
    assert!(std::fs::read(&job.output_path).unwrap().starts_with(b"%PDF"));
}
