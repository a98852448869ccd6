//! Scripted collaborators and fixtures for tests.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;
use tempfile::TempDir;

use crate::chunked::ProgressReporter;
use crate::core::message::AgentMessage;
use crate::core::types::{ChunkReport, RunFinish};
use crate::io::marker::COMPLETION_MARKER;
use crate::io::notifier::Notifier;
use crate::io::session::{AgentInvocationError, SessionRequest, SessionRunner};

/// `system/init` message carrying a session token.
pub fn init_message(session_id: &str) -> AgentMessage {
    AgentMessage::from_value(json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
        "model": "test-model",
    }))
}

/// Assistant message with a single text block.
pub fn text_message(text: &str) -> AgentMessage {
    AgentMessage::from_value(json!({
        "type": "assistant",
        "message": {"content": [{"type": "text", "text": text}]},
    }))
}

/// Successful terminal result.
pub fn result_message(result: &str) -> AgentMessage {
    AgentMessage::from_value(json!({
        "type": "result",
        "subtype": "success",
        "num_turns": 1,
        "result": result,
        "is_error": false,
    }))
}

/// One scripted agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChunk {
    pub messages: Vec<AgentMessage>,
    /// Create the completion marker in the request's workdir after the messages.
    pub write_marker: bool,
    /// Fail with an [`AgentInvocationError`] after the messages.
    pub error: Option<String>,
    /// Write this file (relative to the workdir) with the given content.
    pub artifact: Option<(String, String)>,
}

impl ScriptedChunk {
    pub fn messages(messages: Vec<AgentMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn failure(reason: &str) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn writes_marker(mut self) -> Self {
        self.write_marker = true;
        self
    }

    pub fn writes_file(mut self, relative: &str, content: &str) -> Self {
        self.artifact = Some((relative.to_string(), content.to_string()));
        self
    }
}

/// Session runner that replays one [`ScriptedChunk`] per invocation and
/// records every request. Once the script runs out, invocations yield nothing.
#[derive(Debug, Default)]
pub struct ScriptedSessionRunner {
    script: Mutex<VecDeque<ScriptedChunk>>,
    requests: Mutex<Vec<SessionRequest>>,
}

impl ScriptedSessionRunner {
    pub fn new(script: Vec<ScriptedChunk>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl SessionRunner for ScriptedSessionRunner {
    fn run<'a>(&'a self, request: SessionRequest) -> BoxStream<'a, Result<AgentMessage>> {
        let chunk = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_default();
        let workdir = request.workdir.clone();
        self.requests.lock().expect("requests lock").push(request);
        replay(chunk, workdir).boxed()
    }
}

fn replay(
    chunk: ScriptedChunk,
    workdir: std::path::PathBuf,
) -> impl Stream<Item = Result<AgentMessage>> + Send + 'static {
    try_stream! {
        for message in chunk.messages {
            yield message;
        }
        if let Some((relative, content)) = chunk.artifact {
            std::fs::write(workdir.join(relative), content).context("write scripted artifact")?;
        }
        if chunk.write_marker {
            std::fs::write(workdir.join(COMPLETION_MARKER), "DONE").context("write marker")?;
        }
        if let Some(reason) = chunk.error {
            Err::<(), _>(AgentInvocationError {
                reason,
                exit_code: Some(1),
                stderr_tail: String::new(),
            })?;
        }
    }
}

/// Notifier that records every body and answers with a fixed result.
#[derive(Debug)]
pub struct RecordingNotifier {
    succeed: bool,
    posts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            posts: Mutex::new(Vec::new()),
        }
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().expect("posts lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, body: &str) -> bool {
        self.posts.lock().expect("posts lock").push(body.to_string());
        self.succeed
    }
}

/// Progress reporter that records every event.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    chunks: Mutex<Vec<ChunkReport>>,
    finishes: Mutex<Vec<RunFinish>>,
}

impl RecordingProgress {
    pub fn chunks(&self) -> Vec<ChunkReport> {
        self.chunks.lock().expect("chunks lock").clone()
    }

    pub fn finishes(&self) -> Vec<RunFinish> {
        self.finishes.lock().expect("finishes lock").clone()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn chunk_completed(&self, report: &ChunkReport) {
        self.chunks.lock().expect("chunks lock").push(report.clone());
    }

    async fn run_finished(&self, finish: &RunFinish) {
        self.finishes.lock().expect("finishes lock").push(finish.clone());
    }
}

/// Temporary git repository with one commit containing `README.md`.
pub struct TestRepo {
    temp: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path();
        std::fs::write(root.join("README.md"), "hello\n").context("write README.md")?;
        git(root, &["init", "-q"])?;
        git(root, &["config", "user.email", "runner@example.com"])?;
        git(root, &["config", "user.name", "Runner Test"])?;
        git(root, &["add", "-A"])?;
        git(root, &["-c", "commit.gpgsign=false", "commit", "-q", "-m", "initial"])?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }
}

fn git(root: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !status.success() {
        return Err(anyhow!("git {} failed", args.join(" ")));
    }
    Ok(())
}
