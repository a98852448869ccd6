//! Agent session runner abstraction.
//!
//! The [`SessionRunner`] trait decouples the chunked controller from the
//! agent backend (currently the `claude` CLI in stream-json mode). Tests use
//! scripted runners that yield predetermined messages without spawning
//! processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Result;
use async_stream::try_stream;
use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::core::message::AgentMessage;
use crate::io::config::AgentConfig;

/// Bytes of agent stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 2_000;

/// Parameters for one bounded agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub workdir: PathBuf,
    pub prompt: String,
    /// Turn ceiling enforced by the agent runtime.
    pub max_turns: u32,
    /// Session token to continue; `None` starts a fresh conversation.
    pub resume: Option<String>,
    /// Tool restriction; `None` leaves the agent's defaults in place.
    pub allowed_tools: Option<Vec<String>>,
}

/// Abstraction over agent backends.
///
/// The returned stream is lazy: nothing happens until it is polled, and
/// dropping it abandons the invocation.
pub trait SessionRunner: Send + Sync {
    fn run<'a>(&'a self, request: SessionRequest) -> BoxStream<'a, Result<AgentMessage>>;
}

/// The agent call itself failed. Propagates through the controller untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocationError {
    pub reason: String,
    pub exit_code: Option<i32>,
    pub stderr_tail: String,
}

impl AgentInvocationError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            exit_code: None,
            stderr_tail: String::new(),
        }
    }
}

impl fmt::Display for AgentInvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent invocation failed: {}", self.reason)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {code})")?;
        }
        if !self.stderr_tail.is_empty() {
            write!(f, "\n{}", self.stderr_tail)?;
        }
        Ok(())
    }
}

impl std::error::Error for AgentInvocationError {}

/// Runner that spawns the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeSessionRunner {
    program: String,
    leading_args: Vec<String>,
    model: Option<String>,
    permission_mode: String,
}

impl ClaudeSessionRunner {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        let mut command = cfg.command.iter().cloned();
        Self {
            program: command.next().unwrap_or_else(|| "claude".to_string()),
            leading_args: command.collect(),
            model: cfg.model.clone(),
            permission_mode: cfg.permission_mode.clone(),
        }
    }

    /// Arguments appended after the configured command.
    pub fn build_args(&self, request: &SessionRequest) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(
            [
                "-p",
                "--output-format",
                "stream-json",
                "--verbose",
                "--max-turns",
            ]
            .map(String::from),
        );
        args.push(request.max_turns.to_string());
        args.push("--permission-mode".to_string());
        args.push(self.permission_mode.clone());
        if let Some(tools) = request.allowed_tools.as_ref().filter(|t| !t.is_empty()) {
            args.push("--allowedTools".to_string());
            args.push(tools.join(","));
        }
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(token) = &request.resume {
            args.push("--resume".to_string());
            args.push(token.clone());
        }
        args
    }

    fn spawn_stream(
        &self,
        request: SessionRequest,
    ) -> impl Stream<Item = Result<AgentMessage>> + Send + 'static {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(&request))
            .current_dir(&request.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let program = self.program.clone();

        try_stream! {
            info!(
                workdir = %request.workdir.display(),
                max_turns = request.max_turns,
                resuming = request.resume.is_some(),
                "starting agent session"
            );
            let mut child = cmd.spawn().map_err(|err| {
                error!(err = %err, program = %program, "failed to spawn agent");
                AgentInvocationError::new(format!("spawn {program}: {err}"))
            })?;

            let stdin = child.stdin.take();
            let prompt = request.prompt.into_bytes();
            tokio::spawn(async move {
                let Some(mut stdin) = stdin else { return };
                if let Err(err) = stdin.write_all(&prompt).await {
                    debug!(err = %err, "agent closed stdin early");
                }
                let _ = stdin.shutdown().await;
            });

            let stderr = child.stderr.take();
            let stderr_task = tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_end(&mut buf).await;
                }
                buf
            });

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| AgentInvocationError::new("stdout was not piped"))?;
            let mut lines = BufReader::new(stdout).lines();
            let mut count = 0usize;
            let broken = loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break None,
                    Err(err) => break Some(format!("read agent stdout: {err}")),
                };
                if line.trim().is_empty() {
                    continue;
                }
                match AgentMessage::from_line(&line) {
                    Ok(message) => {
                        count += 1;
                        yield message;
                    }
                    Err(err) => break Some(format!("unparseable agent output: {err:#}")),
                }
            };
            if broken.is_some() {
                let _ = child.start_kill();
            }

            let status = child.wait().await.map_err(|err| {
                AgentInvocationError::new(format!("wait for {program}: {err}"))
            })?;
            let stderr = stderr_task.await.unwrap_or_default();
            if let Some(reason) = broken {
                warn!(reason = %reason, "agent output stream broke");
                let failure = AgentInvocationError {
                    reason,
                    exit_code: status.code(),
                    stderr_tail: stderr_tail(&stderr),
                };
                Err::<(), _>(failure)?;
            }
            if !status.success() {
                warn!(exit_code = ?status.code(), "agent exited with failure");
                let failure = AgentInvocationError {
                    reason: format!("{program} exited unsuccessfully"),
                    exit_code: status.code(),
                    stderr_tail: stderr_tail(&stderr),
                };
                Err::<(), _>(failure)?;
            }
            debug!(messages = count, "agent session finished");
        }
    }
}

impl SessionRunner for ClaudeSessionRunner {
    fn run<'a>(&'a self, request: SessionRequest) -> BoxStream<'a, Result<AgentMessage>> {
        self.spawn_stream(request).boxed()
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[...]{}", &text[start..])
}
