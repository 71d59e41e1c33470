//! Path sandbox shared by the file tools.
//!
//! Every path a tool touches must resolve inside the workspace directory.
//! Resolution is lexical: `..` components are folded before the check so a
//! traversal cannot escape via a path that never exists on disk.

use std::path::{Component, Path, PathBuf};

/// Resolve `raw` against the workspace root, rejecting escapes.
pub fn resolve(workspace: &Path, raw: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace.join(candidate)
    };

    let normalized = normalize(&joined);
    if normalized.starts_with(workspace) {
        Ok(normalized)
    } else {
        Err(format!("path '{raw}' escapes the workspace"))
    }
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
