//! PR description workflow for `issue-runner describe-pr`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::artifact::{ArtifactBudget, run_for_artifact};
use crate::core::message::AgentMessage;
use crate::core::task::Task;
use crate::io::git::Git;
use crate::io::marker::MarkerFile;
use crate::io::prompt::PromptBuilder;
use crate::io::session::SessionRunner;

#[derive(Debug, Clone, PartialEq)]
pub struct DescribeOutcome {
    /// Contents of `.pr-description.md`, if the agent wrote it.
    pub description: Option<String>,
    pub messages: Vec<AgentMessage>,
}

/// Use a provided diff (from `GIT_DIFF`) or fall back to `git diff <base>`.
pub fn resolve_diff(provided: Option<String>, git: &Git, base: &str) -> Result<String> {
    if let Some(diff) = provided.filter(|d| !d.trim().is_empty()) {
        debug!(bytes = diff.len(), "using provided diff");
        return Ok(diff);
    }
    git.diff(base)
        .with_context(|| format!("compute diff against {base}"))
}

#[instrument(skip_all, fields(title = task.title(), diff_bytes = diff.len()))]
pub async fn run_describe<F: FnMut(&AgentMessage)>(
    task: &Task,
    diff: &str,
    workdir: &Path,
    runner: &dyn SessionRunner,
    prompts: &PromptBuilder,
    budget: &ArtifactBudget,
    on_message: F,
) -> Result<DescribeOutcome> {
    let prompt = prompts.build_pr_description(task, diff, workdir)?;
    let outcome = run_for_artifact(
        prompt,
        workdir,
        runner,
        &MarkerFile::pr_description(workdir),
        budget,
        on_message,
    )
    .await?;
    Ok(DescribeOutcome {
        description: outcome.content,
        messages: outcome.messages,
    })
}
