//! Filesystem sentinels the agent writes to signal that it is finished.
//!
//! The agent creates the file; the runner only observes and deletes it.
//! Content is irrelevant for the completion marker and free-form text for the
//! plan and PR description artifacts.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Written by the implementation agent when the task is complete.
pub const COMPLETION_MARKER: &str = ".issue-runner-done";
/// Written by the planning agent; holds the plan text.
pub const PLAN_FILE: &str = ".issue-runner-plan.md";
/// Written by the PR description agent.
pub const PR_DESCRIPTION_FILE: &str = ".pr-description.md";

/// Agent-controlled completion signal observed by the controller.
pub trait CompletionSignal: Send + Sync {
    /// True when the agent has declared the work complete.
    fn observe(&self) -> Result<bool>;
    /// Reset the signal. Clearing an absent signal is not an error.
    fn clear(&self) -> Result<()>;
}

/// Completion signal backed by the existence of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn completion(workdir: &Path) -> Self {
        Self::new(workdir.join(COMPLETION_MARKER))
    }

    pub fn plan(workdir: &Path) -> Self {
        Self::new(workdir.join(PLAN_FILE))
    }

    pub fn pr_description(workdir: &Path) -> Self {
        Self::new(workdir.join(PR_DESCRIPTION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the artifact, returning `None` when it does not exist.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", self.path.display())),
        }
    }
}

impl CompletionSignal for MarkerFile {
    fn observe(&self) -> Result<bool> {
        self.path
            .try_exists()
            .with_context(|| format!("check marker {}", self.path.display()))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "cleared marker");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove marker {}", self.path.display())),
        }
    }
}
