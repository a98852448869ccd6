//! Single bounded agent session whose result is a file the agent writes.
//!
//! Shared by the planning and PR description workflows: clear the artifact,
//! run one fresh session, then read whatever the agent left behind.

use std::path::Path;

use anyhow::Result;
use futures::StreamExt;
use tracing::{info, instrument, warn};

use crate::core::message::AgentMessage;
use crate::io::marker::{CompletionSignal, MarkerFile};
use crate::io::session::{SessionRequest, SessionRunner};

/// Budget for an artifact session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBudget {
    pub max_turns: u32,
    pub allowed_tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactOutcome {
    /// Trimmed artifact content; `None` when the agent never wrote it.
    pub content: Option<String>,
    pub messages: Vec<AgentMessage>,
}

#[instrument(skip_all, fields(artifact = %artifact.path().display(), max_turns = budget.max_turns))]
pub async fn run_for_artifact<F: FnMut(&AgentMessage)>(
    prompt: String,
    workdir: &Path,
    runner: &dyn SessionRunner,
    artifact: &MarkerFile,
    budget: &ArtifactBudget,
    mut on_message: F,
) -> Result<ArtifactOutcome> {
    artifact.clear()?;

    let request = SessionRequest {
        workdir: workdir.to_path_buf(),
        prompt,
        max_turns: budget.max_turns,
        resume: None,
        allowed_tools: budget.allowed_tools.clone(),
    };
    let mut messages = Vec::new();
    let mut stream = runner.run(request);
    while let Some(message) = stream.next().await {
        let message = message?;
        on_message(&message);
        messages.push(message);
    }
    drop(stream);

    let content = artifact
        .read()?
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    match &content {
        Some(text) => info!(bytes = text.len(), "artifact written"),
        None => warn!("agent finished without writing the artifact"),
    }
    Ok(ArtifactOutcome { content, messages })
}
