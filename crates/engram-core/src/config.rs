//! Corpus path resolution.
//!
//! Everything Engram persists lives under one root:
//!
//! ```text
//! <root>/
//!   memories/<project>/<date>--<slug>-<suffix>.md
//!   tasks/<project>/tasks.json | task-<id>.md
//!   data/settings.json
//!   data/projects-registry.json
//!   backups/<timestamp>/...
//!   session-dropoffs/SESSION-DROPOFF-<timestamp>.md
//!   .dashboard-port
//! ```
//!
//! The memory and task roots can be redirected individually through
//! settings or the `MEMORY_DIR` / `TASK_DIR` environment variables.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct CorpusPaths {
    pub root: PathBuf,
    pub memories: PathBuf,
    pub tasks: PathBuf,
    pub data: PathBuf,
    pub backups: PathBuf,
    pub dropoffs: PathBuf,
}

impl CorpusPaths {
    /// Resolve all corpus paths from a root directory and loaded settings.
    pub fn resolve(root: PathBuf, settings: &Settings) -> Self {
        let memories = settings
            .memory_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| root.join("memories"));
        let tasks = settings
            .task_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| root.join("tasks"));
        Self {
            memories,
            tasks,
            data: root.join("data"),
            backups: root.join("backups"),
            dropoffs: root.join("session-dropoffs"),
            root,
        }
    }

    pub fn settings_file(root: &Path) -> PathBuf {
        root.join("data").join("settings.json")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.data.join("projects-registry.json")
    }

    pub fn dashboard_port_file(&self) -> PathBuf {
        self.root.join(".dashboard-port")
    }

    /// Create every directory the corpus needs. Fails fast when the root is
    /// unusable; that is a fatal initialization error for the binaries.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.memories,
            &self.tasks,
            &self.data,
            &self.backups,
            &self.dropoffs,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = s.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}
