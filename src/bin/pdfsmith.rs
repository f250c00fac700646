//! CLI binary for pdfsmith.
//!
//! A thin shim over the library crate that maps subcommands to
//! `ConversionJob`s, flags to `EngineConfig`, and prints the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfsmith::{
    ConversionJob, ConversionResult, EngineConfig, OcrProgressCallback, OperationKind,
    Orchestrator, PageSeparator, ProgressCallback, ToolName, ToolRegistry,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── OCR progress bar ─────────────────────────────────────────────────────────

/// Live OCR progress. Pages finish out of order, so per-page start times
/// are keyed by page number.
struct CliOcrProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<u32, Instant>>,
    errors: AtomicU32,
}

impl CliOcrProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(style);
        bar.set_prefix("OCR");
        bar.set_message("Counting pages…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicU32::new(0),
        })
    }

    fn elapsed_secs(&self, page: u32) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl OcrProgressCallback for CliOcrProgress {
    fn on_ocr_start(&self, total_pages: u32) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);
        self.bar.set_length(u64::from(total_pages));
        self.bar.set_style(style);
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page: u32, _total: u32) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: u32, total: u32, text_len: usize) {
        let secs = self.elapsed_secs(page);
        let size = if text_len > 0 {
            format!("{text_len:>6} bytes")
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page,
            total,
            dim(&size),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, total: u32, error: &str) {
        let secs = self.elapsed_secs(page);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_ocr_complete(&self, total_pages: u32, success_count: u32) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} page(s) recognised", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} page(s) recognised  ({} failed)",
                if success_count == 0 { red("✘") } else { "⚠".to_string() },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Which tools does this machine have?
  pdfsmith tools

  # Office document, spreadsheet, image or text to PDF
  pdfsmith convert report.docx -o report.pdf
  pdfsmith convert page1.png page2.png -o scans.pdf

  # Page-set editing
  pdfsmith extract book.pdf --pages 1,3-5 -o excerpt.pdf
  pdfsmith remove book.pdf --pages 2 -o trimmed.pdf
  pdfsmith merge a.pdf b.pdf c.pdf -o all.pdf --title "Combined"
  pdfsmith organize book.pdf --layout "3,1:90,2" -o reordered.pdf

  # OCR to a searchable PDF, or to plain text
  pdfsmith ocr scan.pdf -o searchable.pdf --language eng+deu
  pdfsmith ocr scan.pdf -o scan.txt --text

  # Machine-readable result
  pdfsmith --json extract book.pdf --pages 1 -o first.pdf

ENVIRONMENT VARIABLES:
  PDFSMITH_TIMEOUT          Conversion timeout in seconds
  PDFSMITH_TOOL_PATHS       Tool overrides, e.g. qpdf=/opt/qpdf/bin/qpdf,soffice=/opt/lo/soffice
  PDFSMITH_OCR_CONCURRENCY  Pages recognised at once
  PDFIUM_LIB_PATH           Path to a libpdfium shared library for in-process rasterising
  RUST_LOG                  Log filter, overrides --verbose / --quiet
"#;

/// Convert documents to PDF and edit PDF page sets with whatever tools
/// are installed.
#[derive(Parser, Debug)]
#[command(
    name = "pdfsmith",
    version,
    about = "Convert documents to PDF, edit page sets and OCR scans using the tools on this machine",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print the result as JSON on stdout.
    #[arg(long, global = true, env = "PDFSMITH_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSMITH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFSMITH_QUIET")]
    quiet: bool,

    /// Disable the OCR progress bar.
    #[arg(long, global = true, env = "PDFSMITH_NO_PROGRESS")]
    no_progress: bool,

    /// Conversion timeout in seconds.
    #[arg(long, global = true, env = "PDFSMITH_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Explicit tool location, `name=path`. Repeatable.
    #[arg(
        long = "tool-path",
        global = true,
        env = "PDFSMITH_TOOL_PATHS",
        value_delimiter = ',',
        value_parser = parse_tool_override
    )]
    tool_paths: Vec<(ToolName, PathBuf)>,

    /// Keep per-attempt working directories for debugging.
    #[arg(long, global = true, env = "PDFSMITH_KEEP_WORKSPACES")]
    keep_workspaces: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect installed tools and print their paths and versions.
    Tools,

    /// Convert an office document, spreadsheet, presentation, image or text file to PDF.
    Convert {
        /// Input files. Several images become one PDF, one page each.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Operation kind, e.g. `office-to-pdf`. Inferred from the extension by default.
        #[arg(long)]
        kind: Option<OperationKind>,
        /// Image resolution used to size image pages.
        #[arg(long)]
        dpi: Option<u32>,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Keep only the selected pages of a PDF.
    Extract {
        input: PathBuf,
        /// Page selection: `all`, `5`, `3-15`, `1,3-5,7`, `8-`.
        #[arg(short, long)]
        pages: String,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Drop the selected pages of a PDF.
    Remove {
        input: PathBuf,
        #[arg(short, long)]
        pages: String,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Concatenate PDFs in the order given.
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Reorder, duplicate and rotate pages: `3,1:90,2-4:180`.
    Organize {
        input: PathBuf,
        #[arg(short, long)]
        layout: String,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Recognise text in a scanned PDF or image.
    Ocr {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Tesseract language list, e.g. `eng+deu`.
        #[arg(short, long, env = "PDFSMITH_OCR_LANGUAGE", default_value = "eng")]
        language: String,
        /// Rasterisation DPI (72–600).
        #[arg(long, env = "PDFSMITH_OCR_DPI", default_value_t = 300,
              value_parser = clap::value_parser!(u32).range(72..=600))]
        dpi: u32,
        /// Write plain text instead of a searchable PDF.
        #[arg(long)]
        text: bool,
        /// Pages recognised at once.
        #[arg(long, env = "PDFSMITH_OCR_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
        /// Text placed before each page in text output: none, marker, formfeed, or custom with `{page}`.
        #[arg(long, env = "PDFSMITH_SEPARATOR", default_value = "marker")]
        separator: String,
    },
}

/// Output document information dictionary.
#[derive(Args, Debug, Default)]
struct MetaArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    keywords: Option<String>,
}

impl MetaArgs {
    fn apply(&self, mut job: ConversionJob) -> ConversionJob {
        let fields = [
            ("title", &self.title),
            ("author", &self.author),
            ("subject", &self.subject),
            ("keywords", &self.keywords),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                job = job.with_option(key, v.as_str());
            }
        }
        job
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during OCR.
    let show_progress = matches!(cli.command, Command::Ocr { .. })
        && !cli.quiet
        && !cli.no_progress
        && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliOcrProgress::new() as Arc<dyn OcrProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Tools ────────────────────────────────────────────────────────────
    if let Command::Tools = cli.command {
        let registry = ToolRegistry::detect(&config).await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&registry).context("Failed to serialise tools")?
            );
        } else {
            print!("{registry}");
            eprintln!(
                "{} of {} tools available",
                registry.available_count(),
                ToolName::ALL.len()
            );
        }
        return Ok(());
    }

    // ── Run job ──────────────────────────────────────────────────────────
    let job = build_job(&cli.command)?;
    let engine = Orchestrator::new(config).await;
    let result = engine.process(&job).await;
    report(&cli, &result)?;

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Map global flags and OCR flags to `EngineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .conversion_timeout(Duration::from_secs(cli.timeout))
        .keep_workspaces(cli.keep_workspaces);
    for (tool, path) in &cli.tool_paths {
        builder = builder.tool_override(*tool, path);
    }
    if let Command::Ocr {
        language,
        dpi,
        concurrency,
        separator,
        ..
    } = &cli.command
    {
        builder = builder
            .default_ocr_language(language.as_str())
            .default_ocr_dpi(*dpi)
            .ocr_concurrency(*concurrency)
            .page_separator(parse_separator(separator));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn build_job(command: &Command) -> Result<ConversionJob> {
    let job = match command {
        Command::Tools => anyhow::bail!("`tools` does not run a job"),
        Command::Convert {
            inputs,
            output,
            kind,
            dpi,
            meta,
        } => {
            let (first, rest) = inputs
                .split_first()
                .context("convert needs at least one input")?;
            let kind = match kind {
                Some(k) => *k,
                None => OperationKind::conversion_for(first).with_context(|| {
                    format!(
                        "Cannot tell what to do with '{}'; pass --kind",
                        first.display()
                    )
                })?,
            };
            let mut job = ConversionJob::new(kind, first, output);
            for extra in rest {
                job = job.with_input(extra);
            }
            if let Some(dpi) = dpi {
                job = job.with_option("dpi", *dpi);
            }
            meta.apply(job)
        }
        Command::Extract {
            input,
            pages,
            output,
            meta,
        } => meta.apply(
            ConversionJob::new(OperationKind::ExtractPages, input, output)
                .with_option("pages", pages.as_str()),
        ),
        Command::Remove {
            input,
            pages,
            output,
            meta,
        } => meta.apply(
            ConversionJob::new(OperationKind::RemovePages, input, output)
                .with_option("pages", pages.as_str()),
        ),
        Command::Merge {
            inputs,
            output,
            meta,
        } => {
            let (first, rest) = inputs
                .split_first()
                .context("merge needs at least two inputs")?;
            let mut job = ConversionJob::new(OperationKind::MergePdfs, first, output);
            for extra in rest {
                job = job.with_input(extra);
            }
            meta.apply(job)
        }
        Command::Organize {
            input,
            layout,
            output,
            meta,
        } => meta.apply(
            ConversionJob::new(OperationKind::OrganizePages, input, output)
                .with_option("layout", layout.as_str()),
        ),
        Command::Ocr {
            input,
            output,
            language,
            dpi,
            text,
            ..
        } => ConversionJob::new(OperationKind::Ocr, input, output)
            .with_option("language", language.as_str())
            .with_option("dpi", *dpi)
            .with_option("text_only", *text),
    };
    Ok(job)
}

fn report(cli: &Cli, result: &ConversionResult) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialise result")?
        );
        return Ok(());
    }
    if result.success {
        if !cli.quiet {
            eprintln!(
                "{}  {}  {}  →  {}",
                green("✔"),
                result.message,
                dim(&format!(
                    "{} · {}ms",
                    result.strategy_used.as_deref().unwrap_or("?"),
                    result.duration_ms
                )),
                bold(
                    &result
                        .output_path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                ),
            );
            for attempt in &result.attempts {
                eprintln!("   {} {}: {}", dim("✗"), attempt.strategy, dim(&attempt.message));
            }
        }
    } else {
        eprintln!("{} {}", red("✘"), result.message);
        for attempt in &result.attempts {
            eprintln!("   {} {}: {}", red("✗"), attempt.strategy, attempt.message);
            if cli.verbose {
                if let Some(stderr) = attempt.diagnostics.get("stderr") {
                    eprintln!("{}", dim(stderr));
                }
            }
        }
        for skipped in &result.skipped {
            eprintln!("   {} {} skipped: {}", dim("-"), skipped.strategy, dim(&skipped.reason));
        }
    }
    Ok(())
}

/// Parse `name=path` for `--tool-path`.
fn parse_tool_override(s: &str) -> Result<(ToolName, PathBuf), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=path, got '{s}'"))?;
    let tool = name.parse::<ToolName>()?;
    if path.trim().is_empty() {
        return Err(format!("empty path for {tool}"));
    }
    Ok((tool, PathBuf::from(path.trim())))
}

/// Parse `--separator` into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "marker" => PageSeparator::Marker,
        "formfeed" | "ff" => PageSeparator::FormFeed,
        _ => PageSeparator::Custom(s.replace("\\n", "\n")),
    }
}
