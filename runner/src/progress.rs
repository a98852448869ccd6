//! Progress reporter that turns controller events into issue comments.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::chunked::ProgressReporter;
use crate::core::comment::{render_chunk_comment, render_final_comment};
use crate::core::types::{ChunkReport, RunFinish};
use crate::io::git::Git;
use crate::io::notifier::Notifier;

/// Posts a comment per chunk and a final comment through a [`Notifier`].
///
/// When a [`Git`] handle is attached, the final comment lists the files the
/// run changed in the working tree.
#[derive(Debug)]
pub struct CommentProgress<N> {
    notifier: N,
    git: Option<Git>,
}

impl<N: Notifier> CommentProgress<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            git: None,
        }
    }

    pub fn with_git(mut self, git: Git) -> Self {
        self.git = Some(git);
        self
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    async fn changed_files(&self) -> Vec<String> {
        let Some(git) = self.git.clone() else {
            return Vec::new();
        };
        match tokio::task::spawn_blocking(move || git.changed_paths()).await {
            Ok(Ok(paths)) => paths,
            Ok(Err(err)) => {
                warn!(err = ?err, "could not list changed files");
                Vec::new()
            }
            Err(err) => {
                warn!(err = %err, "changed files task failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl<N: Notifier> ProgressReporter for CommentProgress<N> {
    async fn chunk_completed(&self, report: &ChunkReport) {
        let posted = self.notifier.post(&render_chunk_comment(report)).await;
        debug!(chunk = report.index + 1, posted, "chunk progress comment");
    }

    async fn run_finished(&self, finish: &RunFinish) {
        let changed = self.changed_files().await;
        let posted = self
            .notifier
            .post(&render_final_comment(finish, &changed))
            .await;
        debug!(stop = %finish.stop, posted, "final progress comment");
    }
}
