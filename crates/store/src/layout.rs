//! State-root layout — where MyClaw keeps its on-disk state.
//!
//! Defaults to `~/.myclaw`, overridable with the `MYCLAW_STATE_DIR`
//! environment variable. The root contains `sessions/`, `workspace/`, and
//! `logs/`.

use std::path::{Path, PathBuf};

/// Environment variable overriding the state root.
pub const STATE_DIR_ENV: &str = "MYCLAW_STATE_DIR";

/// The resolved state-root directory layout.
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    /// Resolve from the environment, falling back to `~/.myclaw`.
    pub fn resolve() -> Self {
        let root = std::env::var(STATE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join(".myclaw"));
        Self { root }
    }

    /// Use an explicit root (tests, embedded deployments).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the directory tree if missing.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.workspace_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

/// Get the user's home directory.
fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}
