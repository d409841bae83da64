//! Runtime configuration.
//!
//! Resolved once at startup from CLI arguments and passed by reference into
//! the pieces that need it. All paths are absolute after construction.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the engine's state directory inside the project.
pub const STATE_DIR: &str = ".stratum";

/// Checkpoint file name inside the state directory.
pub const STATUS_FILE: &str = "running-status.json";

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonicalized project root.
    pub project_dir: PathBuf,
    /// Substitute a fixed delay for every phase action.
    pub dry_run: bool,
    /// Resume from the persisted checkpoint.
    pub resume: bool,
}

impl Config {
    /// Resolve a configuration rooted at `project_dir`.
    pub fn new(project_dir: &Path) -> Result<Self> {
        let project_dir = project_dir.canonicalize().with_context(|| {
            format!("Project directory not found: {}", project_dir.display())
        })?;
        Ok(Self {
            project_dir,
            dry_run: false,
            resume: false,
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Directory holding engine state, inside the project root.
    pub fn state_dir(&self) -> PathBuf {
        self.project_dir.join(STATE_DIR)
    }

    /// Path of the persisted checkpoint file.
    pub fn status_file(&self) -> PathBuf {
        self.state_dir().join(STATUS_FILE)
    }

    /// Create the state directory if it does not exist yet.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(self.state_dir()).with_context(|| {
            format!("Failed to create state directory {}", self.state_dir().display())
        })
    }
}
