//! RunningStatus persistence — the resumable-execution checkpoint.
//!
//! A single JSON file at a fixed project-relative path holds the last
//! executed phase (and, for package phases, the dependency level index).
//! It is overwritten wholesale after every executed action, so concurrent
//! writers within one level interleave last-writer-wins; the file left on
//! disk after a failed run is exactly what a resume invocation needs.
//!
//! Wire format: `{"phaseKey": string, "packageDependencyIndex"?: number}`.

use crate::errors::EngineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// The persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningStatus {
    /// Key of the phase that last executed (or is mid-flight).
    pub phase_key: String,
    /// Dependency level index for package phases; absent for project phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_dependency_index: Option<usize>,
}

impl RunningStatus {
    /// Checkpoint for a project phase.
    pub fn project(phase_key: &str) -> Self {
        Self {
            phase_key: phase_key.to_string(),
            package_dependency_index: None,
        }
    }

    /// Checkpoint for a package phase at a dependency level.
    pub fn package(phase_key: &str, level: usize) -> Self {
        Self {
            phase_key: phase_key.to_string(),
            package_dependency_index: Some(level),
        }
    }

    /// Whether this status points at the given phase/level pair.
    pub fn matches(&self, phase_key: &str, level: Option<usize>) -> bool {
        self.phase_key == phase_key && self.package_dependency_index == level
    }
}

/// File-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read the persisted status.
    ///
    /// A missing file means no resumable state. An unreadable or corrupt
    /// file is logged and likewise treated as no resumable state — a fresh
    /// run beats a failed one.
    pub fn read(&self) -> Option<RunningStatus> {
        if !self.path.exists() {
            return None;
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable checkpoint, starting fresh");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt checkpoint, starting fresh");
                None
            }
        }
    }

    /// Overwrite the checkpoint wholesale.
    pub fn write(&self, status: &RunningStatus) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| EngineError::CheckpointWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        let content =
            serde_json::to_string_pretty(status).context("Failed to serialize running status")?;
        fs::write(&self.path, content).map_err(|source| {
            EngineError::CheckpointWrite {
                path: self.path.clone(),
                source,
            }
            .into()
        })
    }

    /// Remove the checkpoint, if present.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove checkpoint {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_checkpoint() -> (Checkpoint, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".stratum/running-status.json");
        (Checkpoint::new(path), dir)
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (cp, _dir) = make_checkpoint();
        assert!(cp.read().is_none());
    }

    #[test]
    fn test_write_read_roundtrip_project() {
        let (cp, _dir) = make_checkpoint();
        let status = RunningStatus::project("install");
        cp.write(&status).unwrap();
        assert_eq!(cp.read(), Some(status));
    }

    #[test]
    fn test_write_read_roundtrip_package_level() {
        let (cp, _dir) = make_checkpoint();
        let status = RunningStatus::package("compile", 2);
        cp.write(&status).unwrap();
        assert_eq!(cp.read(), Some(status));
    }

    #[test]
    fn test_wire_format_field_names() {
        let (cp, _dir) = make_checkpoint();
        cp.write(&RunningStatus::package("compile", 1)).unwrap();

        let raw = std::fs::read_to_string(cp.path()).unwrap();
        assert!(raw.contains("\"phaseKey\""));
        assert!(raw.contains("\"packageDependencyIndex\""));

        cp.write(&RunningStatus::project("deploy")).unwrap();
        let raw = std::fs::read_to_string(cp.path()).unwrap();
        assert!(!raw.contains("packageDependencyIndex"));
    }

    #[test]
    fn test_corrupt_file_treated_as_fresh() {
        let (cp, _dir) = make_checkpoint();
        std::fs::create_dir_all(cp.path().parent().unwrap()).unwrap();
        std::fs::write(cp.path(), "{ not json").unwrap();
        assert!(cp.read().is_none());
    }

    #[test]
    fn test_overwrite_wholesale() {
        let (cp, _dir) = make_checkpoint();
        cp.write(&RunningStatus::package("install", 0)).unwrap();
        cp.write(&RunningStatus::package("compile", 3)).unwrap();
        assert_eq!(cp.read(), Some(RunningStatus::package("compile", 3)));
    }

    #[test]
    fn test_clear() {
        let (cp, _dir) = make_checkpoint();
        cp.write(&RunningStatus::project("a")).unwrap();
        cp.clear().unwrap();
        assert!(cp.read().is_none());
        // Clearing an absent file is not an error.
        cp.clear().unwrap();
    }

    #[test]
    fn test_matches() {
        let status = RunningStatus::package("compile", 1);
        assert!(status.matches("compile", Some(1)));
        assert!(!status.matches("compile", Some(2)));
        assert!(!status.matches("install", Some(1)));
        assert!(!status.matches("compile", None));
    }
}
