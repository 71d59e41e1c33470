//! Bootstrap file loader.
//!
//! The workspace can carry a fixed set of optional markdown files whose
//! contents are injected into the system prompt. Missing, unreadable, and
//! whitespace-only files are silently skipped; per-file and total size caps
//! keep a runaway workspace from flooding the context window.

use std::path::Path;

use tracing::debug;

/// Candidate filenames, in injection order.
pub const BOOTSTRAP_FILES: [&str; 8] = [
    "AGENTS.md",
    "SOUL.md",
    "USER.md",
    "TOOLS.md",
    "IDENTITY.md",
    "MEMORY.md",
    "HEARTBEAT.md",
    "BOOTSTRAP.md",
];

/// Per-file character cap.
pub const DEFAULT_FILE_CAP: usize = 50_000;
/// Total character cap across all loaded files.
pub const DEFAULT_TOTAL_CAP: usize = 200_000;

/// One loaded bootstrap file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapFile {
    pub name: String,
    pub content: String,
}

/// Load the bootstrap files present in `dir` with the default caps.
pub fn load_bootstrap_files(dir: &Path) -> Vec<BootstrapFile> {
    load_bootstrap_files_with_caps(dir, DEFAULT_FILE_CAP, DEFAULT_TOTAL_CAP)
}

/// Load the bootstrap files present in `dir`.
///
/// Each file is truncated to `file_cap` characters. Once the running total
/// would exceed `total_cap`, the file that crosses the line is included only
/// as the prefix that still fits, and loading stops.
pub fn load_bootstrap_files_with_caps(
    dir: &Path,
    file_cap: usize,
    total_cap: usize,
) -> Vec<BootstrapFile> {
    let mut loaded = Vec::new();
    let mut total = 0usize;

    for name in BOOTSTRAP_FILES {
        let path = dir.join(name);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if content.trim().is_empty() {
            continue;
        }

        let mut content = clamp_chars(&content, file_cap);
        let len = content.chars().count();

        if total + len > total_cap {
            let remaining = total_cap - total;
            if remaining > 0 {
                content = clamp_chars(&content, remaining);
                debug!(file = name, kept = remaining, "Bootstrap total cap reached, truncating");
                loaded.push(BootstrapFile {
                    name: name.to_string(),
                    content,
                });
            }
            break;
        }

        total += len;
        loaded.push(BootstrapFile {
            name: name.to_string(),
            content,
        });
    }

    loaded
}

fn clamp_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}
