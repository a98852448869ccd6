//! Minimal GitHub REST client: issue lookup and issue comments.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::transcript::truncate_chars;

/// `owner/repo` coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid repository '{raw}', expected owner/repo"))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// The subset of an issue the runner reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentCreated {
    id: u64,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
}

impl GithubClient {
    pub fn new(api_base: &str, token: &str, repo: RepoRef, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("issue-runner"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_header).context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("create github api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    /// Post a comment on an issue or pull request. Returns the comment id.
    #[instrument(skip_all, fields(repo = %self.repo.as_slug(), issue_number = issue_number))]
    pub async fn post_issue_comment(&self, issue_number: u64, body: &str) -> Result<u64> {
        let url = format!(
            "{}/repos/{}/{}/issues/{issue_number}/comments",
            self.api_base, self.repo.owner, self.repo.name
        );
        let created: CommentCreated = self
            .send_json(
                "create issue comment",
                self.http.post(url).json(&json!({ "body": body })),
            )
            .await?;
        debug!(comment_id = created.id, "posted issue comment");
        Ok(created.id)
    }

    #[instrument(skip_all, fields(repo = %self.repo.as_slug(), issue_number = issue_number))]
    pub async fn get_issue(&self, issue_number: u64) -> Result<GithubIssue> {
        let url = format!(
            "{}/repos/{}/{}/issues/{issue_number}",
            self.api_base, self.repo.owner, self.repo.name
        );
        self.send_json("get issue", self.http.get(url)).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("github api {operation} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "github api {operation} failed with status {}: {}",
                status.as_u16(),
                truncate_chars(&body, 800)
            );
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("decode github {operation} response"))
    }
}
