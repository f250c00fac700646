//! Where each tool is looked for: executable names for the PATH search and
//! fixed install locations per OS family, probed in order before PATH.

use std::path::PathBuf;

use super::ToolName;

/// Environment variable naming an explicit libpdfium path.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Names tried against PATH, in order. Empty for libraries.
pub fn executable_names(tool: ToolName) -> &'static [&'static str] {
    match tool {
        ToolName::Soffice => &["soffice", "libreoffice"],
        ToolName::Unoconv => &["unoconv"],
        ToolName::Python => &["python3", "python"],
        ToolName::Pdftoppm => &["pdftoppm"],
        ToolName::Ghostscript => {
            if cfg!(windows) {
                &["gswin64c", "gswin32c", "gs"]
            } else {
                &["gs"]
            }
        }
        ToolName::Tesseract => &["tesseract"],
        ToolName::Qpdf => &["qpdf"],
        // `convert` on Windows is the FAT-to-NTFS system utility.
        ToolName::ImageMagick => {
            if cfg!(windows) {
                &["magick"]
            } else {
                &["magick", "convert"]
            }
        }
        ToolName::PowerShell => &["pwsh", "powershell"],
        ToolName::Pdfium => &[],
    }
}

/// Platform file name of the pdfium shared library.
pub fn pdfium_library_name() -> &'static str {
    if cfg!(windows) {
        "pdfium.dll"
    } else if cfg!(target_os = "macos") {
        "libpdfium.dylib"
    } else {
        "libpdfium.so"
    }
}

/// Fixed install locations for the current OS, most specific first.
pub fn well_known_paths(tool: ToolName) -> Vec<PathBuf> {
    if cfg!(windows) {
        windows_paths(tool)
    } else if cfg!(target_os = "macos") {
        macos_paths(tool)
    } else {
        linux_paths(tool)
    }
}

fn in_dirs(dirs: &[&str], names: &[&str]) -> Vec<PathBuf> {
    dirs.iter()
        .flat_map(|d| names.iter().map(move |n| PathBuf::from(d).join(n)))
        .collect()
}

fn linux_paths(tool: ToolName) -> Vec<PathBuf> {
    let mut paths = match tool {
        ToolName::Soffice => vec![
            PathBuf::from("/usr/lib/libreoffice/program/soffice"),
            PathBuf::from("/opt/libreoffice/program/soffice"),
            PathBuf::from("/usr/lib64/libreoffice/program/soffice"),
            PathBuf::from("/snap/bin/libreoffice"),
        ],
        ToolName::Pdfium => {
            return in_dirs(
                &["/usr/local/lib", "/usr/lib", "/usr/lib/x86_64-linux-gnu", "/usr/lib/aarch64-linux-gnu"],
                &[pdfium_library_name()],
            )
        }
        _ => Vec::new(),
    };
    paths.extend(in_dirs(&["/usr/bin", "/usr/local/bin"], executable_names(tool)));
    paths
}

fn macos_paths(tool: ToolName) -> Vec<PathBuf> {
    let mut paths = match tool {
        ToolName::Soffice => vec![PathBuf::from(
            "/Applications/LibreOffice.app/Contents/MacOS/soffice",
        )],
        ToolName::Pdfium => {
            return in_dirs(
                &["/opt/homebrew/lib", "/usr/local/lib"],
                &[pdfium_library_name()],
            )
        }
        _ => Vec::new(),
    };
    paths.extend(in_dirs(
        &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"],
        executable_names(tool),
    ));
    paths
}

fn windows_paths(tool: ToolName) -> Vec<PathBuf> {
    let program_files = ["C:\\Program Files", "C:\\Program Files (x86)"];
    let under = |rel: &str| -> Vec<PathBuf> {
        program_files
            .iter()
            .map(|pf| PathBuf::from(pf).join(rel))
            .collect()
    };
    match tool {
        ToolName::Soffice => under("LibreOffice\\program\\soffice.exe"),
        ToolName::Tesseract => under("Tesseract-OCR\\tesseract.exe"),
        ToolName::Qpdf => under("qpdf\\bin\\qpdf.exe"),
        ToolName::PowerShell => vec![
            PathBuf::from("C:\\Program Files\\PowerShell\\7\\pwsh.exe"),
            PathBuf::from("C:\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe"),
        ],
        ToolName::Pdfium => under("pdfium\\bin\\pdfium.dll"),
        _ => Vec::new(),
    }
}
