//! Best-effort delivery of progress comments.
//!
//! A failed comment must never abort the work it reports on, so the
//! [`Notifier`] contract is a boolean, not a `Result`.

use async_trait::async_trait;
use tracing::warn;

use crate::io::github::GithubClient;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a comment body. Returns `true` on success; failures are logged, never raised.
    async fn post(&self, body: &str) -> bool;
}

/// Discards every comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn post(&self, _body: &str) -> bool {
        true
    }
}

/// Posts comments on one GitHub issue or pull request.
#[derive(Debug, Clone)]
pub struct GithubNotifier {
    client: GithubClient,
    issue_number: u64,
}

impl GithubNotifier {
    pub fn new(client: GithubClient, issue_number: u64) -> Self {
        Self {
            client,
            issue_number,
        }
    }
}

#[async_trait]
impl Notifier for GithubNotifier {
    async fn post(&self, body: &str) -> bool {
        match self.client.post_issue_comment(self.issue_number, body).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    err = ?err,
                    issue_number = self.issue_number,
                    repo = %self.client.repo().as_slug(),
                    "failed to post issue comment"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;

    use super::*;
    use crate::io::github::RepoRef;

    fn notifier(base: &str) -> GithubNotifier {
        let client = GithubClient::new(
            base,
            "token",
            RepoRef::parse("owner/repo").expect("repo"),
            Duration::from_secs(2),
        )
        .expect("client");
        GithubNotifier::new(client, 12)
    }

    #[tokio::test]
    async fn github_notifier_reports_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/repos/owner/repo/issues/12/comments");
                then.status(201).json_body(serde_json::json!({ "id": 1 }));
            })
            .await;

        assert!(notifier(&server.base_url()).post("progress").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn github_notifier_swallows_api_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/repos/owner/repo/issues/12/comments");
                then.status(500).body("boom");
            })
            .await;

        assert!(!notifier(&server.base_url()).post("progress").await);
    }

    #[tokio::test]
    async fn github_notifier_swallows_transport_failures() {
        // Nothing listens on port 9 in test environments.
        assert!(!notifier("http://127.0.0.1:9").post("progress").await);
    }

    #[tokio::test]
    async fn noop_notifier_always_succeeds() {
        assert!(NoopNotifier.post("anything").await);
    }
}
