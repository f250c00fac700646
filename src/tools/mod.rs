//! Tool discovery: which external programs are installed, where, and which
//! version.
//!
//! Detection order for every tool:
//!
//! 1. an explicit path from [`EngineConfig::tool_overrides`],
//! 2. the OS family's well-known install locations ([`locations`]),
//! 3. a PATH search over the tool's executable names.
//!
//! A found executable is then asked for its version under
//! `EngineConfig::probe_timeout`; a failed probe leaves the tool available
//! with an unknown version. All tools are probed concurrently. A missing
//! tool is a normal outcome, never an error.
//!
//! The registry is a read-only snapshot. [`ToolRegistry::shared`] detects
//! once per process; [`ToolRegistry::detect`] always re-detects.

pub mod locations;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::ToolUnavailable;
use crate::exec::ToolCommand;

/// Every external dependency the engine knows how to use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ToolName {
    /// LibreOffice / OpenOffice headless converter.
    Soffice,
    /// UNO-based converter script; needs [`ToolName::Python`].
    Unoconv,
    Python,
    /// Poppler rasterizer.
    Pdftoppm,
    Ghostscript,
    Tesseract,
    /// Page-level PDF tool.
    Qpdf,
    ImageMagick,
    /// Drives Microsoft Office through COM on Windows.
    PowerShell,
    /// Shared library for in-process rasterising; never executed.
    Pdfium,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        ToolName::Soffice,
        ToolName::Unoconv,
        ToolName::Python,
        ToolName::Pdftoppm,
        ToolName::Ghostscript,
        ToolName::Tesseract,
        ToolName::Qpdf,
        ToolName::ImageMagick,
        ToolName::PowerShell,
        ToolName::Pdfium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Soffice => "soffice",
            ToolName::Unoconv => "unoconv",
            ToolName::Python => "python",
            ToolName::Pdftoppm => "pdftoppm",
            ToolName::Ghostscript => "ghostscript",
            ToolName::Tesseract => "tesseract",
            ToolName::Qpdf => "qpdf",
            ToolName::ImageMagick => "imagemagick",
            ToolName::PowerShell => "powershell",
            ToolName::Pdfium => "pdfium",
        }
    }

    pub fn is_library(&self) -> bool {
        matches!(self, ToolName::Pdfium)
    }

    /// Arguments that make the tool print its version and exit.
    pub fn version_args(&self) -> &'static [&'static str] {
        match self {
            ToolName::Pdftoppm => &["-v"],
            ToolName::PowerShell => &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "$PSVersionTable.PSVersion.ToString()",
            ],
            ToolName::Pdfium => &[],
            _ => &["--version"],
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        let needle = match needle.as_str() {
            "gs" => "ghostscript",
            "libreoffice" => "soffice",
            "magick" => "imagemagick",
            "pwsh" => "powershell",
            other => other,
        };
        ToolName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

/// Detection result for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolBinary {
    pub name: ToolName,
    pub resolved_path: Option<PathBuf>,
    pub version: Option<String>,
    pub available: bool,
}

impl ToolBinary {
    pub fn missing(name: ToolName) -> Self {
        Self {
            name,
            resolved_path: None,
            version: None,
            available: false,
        }
    }

    pub fn found(name: ToolName, path: impl Into<PathBuf>, version: Option<String>) -> Self {
        Self {
            name,
            resolved_path: Some(path.into()),
            version,
            available: true,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.resolved_path.as_deref().filter(|_| self.available)
    }
}

/// Snapshot of every known tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, ToolBinary>,
}

static SHARED: OnceCell<Arc<ToolRegistry>> = OnceCell::const_new();

impl ToolRegistry {
    /// Process-wide registry, detected on first use with `config`.
    ///
    /// Later calls return the same snapshot whatever config they pass.
    pub async fn shared(config: &EngineConfig) -> Arc<ToolRegistry> {
        SHARED
            .get_or_init(|| async { Arc::new(Self::detect(config).await) })
            .await
            .clone()
    }

    /// Detect every tool now.
    pub async fn detect(config: &EngineConfig) -> Self {
        let start = Instant::now();
        let results = join_all(ToolName::ALL.iter().map(|&tool| detect_one(tool, config))).await;
        let registry = Self::from_tools(results);
        info!(
            "Tool detection: {}/{} available in {}ms",
            registry.available_count(),
            ToolName::ALL.len(),
            start.elapsed().as_millis()
        );
        registry
    }

    /// Build a registry from known results; unspecified tools are missing.
    pub fn from_tools(tools: impl IntoIterator<Item = ToolBinary>) -> Self {
        let mut map: BTreeMap<ToolName, ToolBinary> = ToolName::ALL
            .iter()
            .map(|&t| (t, ToolBinary::missing(t)))
            .collect();
        for tool in tools {
            map.insert(tool.name, tool);
        }
        Self { tools: map }
    }

    /// A registry in which nothing is installed.
    pub fn empty() -> Self {
        Self::from_tools([])
    }

    pub fn get(&self, tool: ToolName) -> &ToolBinary {
        // from_tools seeds every variant
        &self.tools[&tool]
    }

    pub fn is_available(&self, tool: ToolName) -> bool {
        self.get(tool).available
    }

    pub fn path(&self, tool: ToolName) -> Option<&Path> {
        self.get(tool).path()
    }

    /// The tool's path, or the reason a strategy needing it must be skipped.
    pub fn require(&self, tool: ToolName) -> Result<&Path, ToolUnavailable> {
        self.path(tool)
            .ok_or_else(|| ToolUnavailable::new(format!("{tool} is not installed")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolBinary> {
        self.tools.values()
    }

    pub fn available_count(&self) -> usize {
        self.tools.values().filter(|t| t.available).count()
    }
}

impl fmt::Display for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:<9} {:<14} PATH", "TOOL", "STATUS", "VERSION")?;
        for tool in self.tools.values() {
            writeln!(
                f,
                "{:<12} {:<9} {:<14} {}",
                tool.name.as_str(),
                if tool.available { "found" } else { "missing" },
                tool.version.as_deref().unwrap_or("-"),
                tool.resolved_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".into()),
            )?;
        }
        Ok(())
    }
}

// ── Detection ────────────────────────────────────────────────────────────

async fn detect_one(tool: ToolName, config: &EngineConfig) -> ToolBinary {
    let Some(path) = locate(tool, &config.tool_overrides) else {
        debug!("{}: not found", tool);
        return ToolBinary::missing(tool);
    };
    let version = if tool.is_library() {
        None
    } else {
        probe_version(tool, &path, config).await
    };
    debug!(
        "{}: {} (version {})",
        tool,
        path.display(),
        version.as_deref().unwrap_or("unknown")
    );
    ToolBinary::found(tool, path, version)
}

fn locate(tool: ToolName, overrides: &BTreeMap<ToolName, PathBuf>) -> Option<PathBuf> {
    if let Some(p) = overrides.get(&tool) {
        if p.is_file() {
            return Some(p.clone());
        }
        warn!(
            "Configured path for {} does not exist: {}",
            tool,
            p.display()
        );
    }
    if tool == ToolName::Pdfium {
        if let Some(p) = std::env::var_os(locations::PDFIUM_LIB_ENV).map(PathBuf::from) {
            if p.is_file() {
                return Some(p);
            }
        }
    }
    if let Some(p) = locations::well_known_paths(tool)
        .into_iter()
        .find(|p| p.is_file())
    {
        return Some(p);
    }
    locations::executable_names(tool)
        .iter()
        .find_map(|name| which::which(name).ok())
}

async fn probe_version(tool: ToolName, path: &Path, config: &EngineConfig) -> Option<String> {
    let result = ToolCommand::new(path, config.probe_timeout)
        .args(tool.version_args())
        .output()
        .await;
    match result {
        Ok(out) => {
            let version = parse_version(&out.stdout).or_else(|| parse_version(&out.stderr));
            if version.is_none() {
                debug!("{}: no version in probe output", tool);
            }
            version
        }
        Err(e) => {
            debug!("{}: version probe failed: {}", tool, e);
            None
        }
    }
}

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)+").expect("valid version regex"));

/// First dotted version number in `text`.
pub fn parse_version(text: &str) -> Option<String> {
    VERSION_RE.find(text).map(|m| m.as_str().to_string())
}
