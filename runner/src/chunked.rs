//! Chunked turn-budget controller for `issue-runner implement`.
//!
//! The agent runtime caps turns per invocation. The controller makes one
//! long task look continuous by running bounded chunks that resume the same
//! session, stopping as soon as the agent writes the completion marker.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::core::message::AgentMessage;
use crate::core::resume::ResumeState;
use crate::core::task::Task;
use crate::core::transcript::{render_transcript, reply_text};
use crate::core::types::{ChunkReport, RunFinish, RunStop};
use crate::io::config::RunnerConfig;
use crate::io::marker::CompletionSignal;
use crate::io::prompt::PromptBuilder;
use crate::io::session::{SessionRequest, SessionRunner};

/// Budgets and switches for one controller run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedConfig {
    pub max_chunks: u32,
    pub turns_per_chunk: u32,
    /// Turn ceiling for the summary sub-agent.
    pub summary_turns: u32,
    /// Run the summary sub-agent after each chunk and at the end.
    pub summaries: bool,
    pub transcript_budget_bytes: usize,
    /// Tool restriction for work chunks. Summary calls are never restricted.
    pub allowed_tools: Option<Vec<String>>,
}

impl ChunkedConfig {
    pub fn from_runner_config(cfg: &RunnerConfig) -> Self {
        Self {
            max_chunks: cfg.max_chunks,
            turns_per_chunk: cfg.turns_per_chunk,
            summary_turns: cfg.summary_turns,
            summaries: cfg.summaries,
            transcript_budget_bytes: cfg.transcript_budget_bytes,
            allowed_tools: Some(cfg.agent.allowed_tools.clone()).filter(|t| !t.is_empty()),
        }
    }
}

impl Default for ChunkedConfig {
    fn default() -> Self {
        Self::from_runner_config(&RunnerConfig::default())
    }
}

/// Observer for chunk boundaries and the terminal state.
///
/// Implementations are best-effort: they cannot fail the run.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn chunk_completed(&self, report: &ChunkReport);
    async fn run_finished(&self, finish: &RunFinish);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn chunk_completed(&self, _report: &ChunkReport) {}
    async fn run_finished(&self, _finish: &RunFinish) {}
}

/// External collaborators of a controller run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runner: &'a dyn SessionRunner,
    pub signal: &'a dyn CompletionSignal,
    pub progress: &'a dyn ProgressReporter,
}

/// Summary of a controller run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub stop: RunStop,
    pub chunks_run: u32,
    /// Resume token captured from chunk 0, if any.
    pub session_id: Option<String>,
    /// Every message of every chunk, in arrival order.
    pub messages: Vec<AgentMessage>,
    pub summaries: Vec<String>,
    pub final_summary: Option<String>,
}

/// Run `task` in up to `config.max_chunks` bounded agent invocations.
///
/// Every message is handed to `on_message` as soon as it arrives. Stops with
/// [`RunStop::Done`] once the completion signal is observed after a chunk,
/// or [`RunStop::Exhausted`] when the chunk budget runs out. Agent failures
/// propagate; summary and progress failures never do.
#[instrument(skip_all, fields(max_chunks = config.max_chunks, turns_per_chunk = config.turns_per_chunk))]
pub async fn run_chunked<F: FnMut(&AgentMessage)>(
    task: &Task,
    workdir: &Path,
    collab: Collaborators<'_>,
    prompts: &PromptBuilder,
    config: &ChunkedConfig,
    mut on_message: F,
) -> Result<RunOutcome> {
    task.validate()?;
    collab.signal.clear()?;

    let mut resume = ResumeState::new();
    let mut messages = Vec::new();
    let mut summaries = Vec::new();
    let mut chunks_run = 0u32;
    let mut stop = RunStop::Exhausted;

    for index in 0..config.max_chunks {
        let prompt = if index == 0 {
            prompts.build_initial(task, workdir)?
        } else {
            prompts.build_continuation(task, workdir)?
        };
        let request = SessionRequest {
            workdir: workdir.to_path_buf(),
            prompt,
            max_turns: config.turns_per_chunk,
            resume: resume.token_for(index).map(str::to_string),
            allowed_tools: config.allowed_tools.clone(),
        };
        info!(
            chunk = index + 1,
            max_chunks = config.max_chunks,
            resuming = request.resume.is_some(),
            "starting chunk"
        );

        let mut chunk_messages = Vec::new();
        let mut stream = collab.runner.run(request);
        while let Some(message) = stream.next().await {
            let message = message?;
            if resume.observe(index, &message) {
                debug!(session_id = resume.token(), "captured session token");
            }
            on_message(&message);
            chunk_messages.push(message);
        }
        drop(stream);
        chunks_run = index + 1;

        if index == 0 && resume.token().is_none() {
            warn!("first chunk exposed no session token; later chunks start fresh sessions");
        }

        let summary = if config.summaries {
            summarize_chunk(collab.runner, task, workdir, index, &chunk_messages, prompts, config).await
        } else {
            None
        };
        if let Some(summary) = &summary {
            summaries.push(summary.clone());
        }

        collab
            .progress
            .chunk_completed(&ChunkReport {
                index,
                max_chunks: config.max_chunks,
                turn_budget: config.turns_per_chunk,
                message_count: chunk_messages.len(),
                summary,
            })
            .await;
        messages.extend(chunk_messages);

        if collab.signal.observe()? {
            collab.signal.clear()?;
            stop = RunStop::Done;
            info!(chunks_run, "completion marker observed");
            break;
        }
    }

    if stop == RunStop::Exhausted {
        info!(chunks_run, "chunk budget exhausted without completion");
    }

    let final_summary = if config.summaries && !summaries.is_empty() {
        summarize_run(collab.runner, task, workdir, &summaries, stop, prompts, config).await
    } else {
        None
    };

    let finish = RunFinish {
        stop,
        chunks_run,
        summaries: summaries.clone(),
        final_summary: final_summary.clone(),
    };
    collab.progress.run_finished(&finish).await;

    Ok(RunOutcome {
        stop,
        chunks_run,
        session_id: resume.token().map(str::to_string),
        messages,
        summaries,
        final_summary,
    })
}

async fn summarize_chunk(
    runner: &dyn SessionRunner,
    task: &Task,
    workdir: &Path,
    index: u32,
    chunk_messages: &[AgentMessage],
    prompts: &PromptBuilder,
    config: &ChunkedConfig,
) -> Option<String> {
    let transcript = render_transcript(chunk_messages, config.transcript_budget_bytes);
    let prompt = match prompts.build_chunk_summary(task, index, &transcript) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(err = ?err, chunk = index + 1, "failed to build chunk summary prompt");
            return None;
        }
    };
    match ask(runner, workdir, prompt, config.summary_turns).await {
        Ok(summary) => summary,
        Err(err) => {
            warn!(err = ?err, chunk = index + 1, "chunk summary failed");
            None
        }
    }
}

async fn summarize_run(
    runner: &dyn SessionRunner,
    task: &Task,
    workdir: &Path,
    summaries: &[String],
    stop: RunStop,
    prompts: &PromptBuilder,
    config: &ChunkedConfig,
) -> Option<String> {
    let prompt = match prompts.build_final_summary(task, summaries, stop) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(err = ?err, "failed to build final summary prompt");
            return None;
        }
    };
    match ask(runner, workdir, prompt, config.summary_turns).await {
        Ok(summary) => summary,
        Err(err) => {
            warn!(err = ?err, "final summary failed");
            None
        }
    }
}

/// One fresh, tool-unrestricted invocation whose reply text is the result.
async fn ask(
    runner: &dyn SessionRunner,
    workdir: &Path,
    prompt: String,
    max_turns: u32,
) -> Result<Option<String>> {
    let request = SessionRequest {
        workdir: workdir.to_path_buf(),
        prompt,
        max_turns,
        resume: None,
        allowed_tools: None,
    };
    let mut stream = runner.run(request);
    let mut replies = Vec::new();
    while let Some(message) = stream.next().await {
        replies.push(message?);
    }
    Ok(reply_text(&replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::marker::{COMPLETION_MARKER, MarkerFile};
    use crate::test_support::{
        RecordingProgress, ScriptedChunk, ScriptedSessionRunner, init_message, result_message,
        text_message,
    };

    fn task() -> Task {
        Task::new("Add logging", "").expect("task")
    }

    fn config(max_chunks: u32, summaries: bool) -> ChunkedConfig {
        ChunkedConfig {
            max_chunks,
            summaries,
            ..ChunkedConfig::default()
        }
    }

    #[tokio::test]
    async fn stale_marker_is_cleared_before_first_chunk() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join(COMPLETION_MARKER), "DONE").expect("stale marker");
        let runner = ScriptedSessionRunner::new(vec![ScriptedChunk::messages(vec![text_message("working")])]);
        let signal = MarkerFile::completion(temp.path());

        let outcome = run_chunked(
            &task(),
            temp.path(),
            Collaborators {
                runner: &runner,
                signal: &signal,
                progress: &NoopProgress,
            },
            &PromptBuilder::new(60_000),
            &config(2, false),
            |_| {},
        )
        .await
        .expect("run");

        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(outcome.chunks_run, 2);
    }

    #[tokio::test]
    async fn invalid_task_never_reaches_the_agent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(Vec::new());
        let signal = MarkerFile::completion(temp.path());
        let bad = Task {
            title: "   ".to_string(),
            body: "body".to_string(),
        };

        let err = run_chunked(
            &bad,
            temp.path(),
            Collaborators {
                runner: &runner,
                signal: &signal,
                progress: &NoopProgress,
            },
            &PromptBuilder::new(60_000),
            &config(2, false),
            |_| {},
        )
        .await
        .expect_err("should fail");

        assert!(err.downcast_ref::<crate::core::task::InvalidTaskError>().is_some());
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn continuation_prompt_used_after_first_chunk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(vec![
            ScriptedChunk::messages(vec![init_message("abc")]),
            ScriptedChunk::messages(vec![text_message("more")]).writes_marker(),
        ]);
        let signal = MarkerFile::completion(temp.path());

        let outcome = run_chunked(
            &task(),
            temp.path(),
            Collaborators {
                runner: &runner,
                signal: &signal,
                progress: &NoopProgress,
            },
            &PromptBuilder::new(60_000),
            &config(5, false),
            |_| {},
        )
        .await
        .expect("run");

        let requests = runner.requests();
        assert_eq!(outcome.stop, RunStop::Done);
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].prompt.contains("continuing a task"));
        assert!(requests[1].prompt.contains("continuing a task"));
        assert_eq!(requests[1].resume.as_deref(), Some("abc"));
        assert!(requests.iter().all(|r| r.max_turns == 10));
        assert!(!signal.path().exists());
    }

    #[tokio::test]
    async fn summaries_use_fresh_unrestricted_sessions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(vec![
            ScriptedChunk::messages(vec![init_message("abc"), text_message("edit")]).writes_marker(),
            ScriptedChunk::messages(vec![result_message("Chunk one added a logger.")]),
            ScriptedChunk::messages(vec![result_message("Logging added.")]),
        ]);
        let signal = MarkerFile::completion(temp.path());
        let progress = RecordingProgress::default();

        let outcome = run_chunked(
            &task(),
            temp.path(),
            Collaborators {
                runner: &runner,
                signal: &signal,
                progress: &progress,
            },
            &PromptBuilder::new(60_000),
            &config(3, true),
            |_| {},
        )
        .await
        .expect("run");

        assert_eq!(outcome.summaries, vec!["Chunk one added a logger.".to_string()]);
        assert_eq!(outcome.final_summary.as_deref(), Some("Logging added."));
        assert_eq!(outcome.messages.len(), 2);

        let requests = runner.requests();
        assert_eq!(requests.len(), 3);
        for summary_request in &requests[1..] {
            assert_eq!(summary_request.resume, None);
            assert_eq!(summary_request.allowed_tools, None);
            assert_eq!(summary_request.max_turns, 3);
        }
        assert!(requests[1].prompt.contains("[assistant] edit"));

        let chunks = progress.chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].summary.as_deref(), Some("Chunk one added a logger."));
        let finishes = progress.finishes();
        assert_eq!(finishes.len(), 1);
        assert_eq!(finishes[0].stop, RunStop::Done);
    }

    #[tokio::test]
    async fn summary_failure_does_not_abort_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(vec![
            ScriptedChunk::messages(vec![text_message("edit")]).writes_marker(),
            ScriptedChunk::failure("summary agent crashed"),
        ]);
        let signal = MarkerFile::completion(temp.path());
        let progress = RecordingProgress::default();

        let outcome = run_chunked(
            &task(),
            temp.path(),
            Collaborators {
                runner: &runner,
                signal: &signal,
                progress: &progress,
            },
            &PromptBuilder::new(60_000),
            &config(3, true),
            |_| {},
        )
        .await
        .expect("run");

        assert_eq!(outcome.stop, RunStop::Done);
        assert!(outcome.summaries.is_empty());
        assert_eq!(outcome.final_summary, None);
        assert_eq!(progress.chunks()[0].summary, None);
    }

    #[tokio::test]
    async fn agent_failure_propagates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedSessionRunner::new(vec![ScriptedChunk::failure("agent crashed")]);
        let signal = MarkerFile::completion(temp.path());
        let progress = RecordingProgress::default();

        let err = run_chunked(
            &task(),
            temp.path(),
            Collaborators {
                runner: &runner,
                signal: &signal,
                progress: &progress,
            },
            &PromptBuilder::new(60_000),
            &config(3, true),
            |_| {},
        )
        .await
        .expect_err("should fail");

        assert!(
            err.downcast_ref::<crate::io::session::AgentInvocationError>()
                .is_some()
        );
        assert!(progress.finishes().is_empty());
    }
}
