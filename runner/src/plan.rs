//! Planning workflow for `issue-runner plan`.

use std::path::Path;

use anyhow::Result;
use tracing::instrument;

use crate::artifact::{ArtifactBudget, run_for_artifact};
use crate::core::message::AgentMessage;
use crate::core::task::Task;
use crate::io::marker::MarkerFile;
use crate::io::prompt::PromptBuilder;
use crate::io::session::SessionRunner;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    /// Plan text, or `None` if the agent never wrote the plan file.
    pub plan: Option<String>,
    pub messages: Vec<AgentMessage>,
}

/// Run one analysis-only session that writes the plan file.
///
/// A missing plan is reported as `plan: None`, not as an error.
#[instrument(skip_all, fields(title = task.title()))]
pub async fn run_plan<F: FnMut(&AgentMessage)>(
    task: &Task,
    workdir: &Path,
    runner: &dyn SessionRunner,
    prompts: &PromptBuilder,
    budget: &ArtifactBudget,
    on_message: F,
) -> Result<PlanOutcome> {
    let prompt = prompts.build_plan(task, workdir)?;
    let outcome = run_for_artifact(
        prompt,
        workdir,
        runner,
        &MarkerFile::plan(workdir),
        budget,
        on_message,
    )
    .await?;
    Ok(PlanOutcome {
        plan: outcome.content,
        messages: outcome.messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::InvalidTaskError;
    use crate::io::marker::{COMPLETION_MARKER, PLAN_FILE};
    use crate::test_support::{ScriptedChunk, ScriptedSessionRunner, init_message};

    fn budget() -> ArtifactBudget {
        ArtifactBudget {
            max_turns: 10,
            allowed_tools: Some(vec!["Read".to_string(), "Write".to_string()]),
        }
    }

    #[tokio::test]
    async fn plan_is_read_from_plan_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(vec![
            ScriptedChunk::messages(vec![init_message("p1")])
                .writes_file(PLAN_FILE, "## Plan\n\n1. Add tracing"),
        ]);

        let outcome = run_plan(
            &Task::new("Add logging", "").expect("task"),
            temp.path(),
            &runner,
            &PromptBuilder::new(60_000),
            &budget(),
            |_| {},
        )
        .await
        .expect("plan");

        assert_eq!(outcome.plan.as_deref(), Some("## Plan\n\n1. Add tracing"));
        assert_eq!(outcome.messages.len(), 1);
        let request = &runner.requests()[0];
        assert!(request.prompt.contains(PLAN_FILE));
        assert_eq!(request.allowed_tools, budget().allowed_tools);
    }

    #[tokio::test]
    async fn completion_marker_does_not_count_as_a_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(vec![
            ScriptedChunk::messages(Vec::new()).writes_file(COMPLETION_MARKER, "DONE"),
        ]);

        let outcome = run_plan(
            &Task::new("Add logging", "").expect("task"),
            temp.path(),
            &runner,
            &PromptBuilder::new(60_000),
            &budget(),
            |_| {},
        )
        .await
        .expect("plan");

        assert_eq!(outcome.plan, None);
    }

    #[tokio::test]
    async fn empty_title_fails_before_agent_call() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(Vec::new());
        let err = run_plan(
            &Task {
                title: String::new(),
                body: String::new(),
            },
            temp.path(),
            &runner,
            &PromptBuilder::new(60_000),
            &budget(),
            |_| {},
        )
        .await
        .expect_err("should fail");

        assert!(err.downcast_ref::<InvalidTaskError>().is_some());
        assert!(runner.requests().is_empty());
    }
}
