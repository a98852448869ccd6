//! `issue-runner`: drive a coding agent against a GitHub issue from CI.
//!
//! Every agent message is echoed to stdout as one JSON line, followed by a
//! final result line. Diagnostics go to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use issue_runner::artifact::ArtifactBudget;
use issue_runner::chunked::{
    ChunkedConfig, Collaborators, NoopProgress, ProgressReporter, run_chunked,
};
use issue_runner::core::comment::render_plan_comment;
use issue_runner::core::message::AgentMessage;
use issue_runner::core::task::Task;
use issue_runner::core::types::RunStop;
use issue_runner::describe::{resolve_diff, run_describe};
use issue_runner::exit_codes;
use issue_runner::io::config::{CONFIG_FILE, RunnerConfig, init_config, load_config};
use issue_runner::io::git::Git;
use issue_runner::io::github::{GithubClient, RepoRef};
use issue_runner::io::marker::MarkerFile;
use issue_runner::io::notifier::{GithubNotifier, Notifier};
use issue_runner::io::prompt::PromptBuilder;
use issue_runner::io::session::ClaudeSessionRunner;
use issue_runner::logging;
use issue_runner::plan::run_plan;
use issue_runner::progress::CommentProgress;

#[derive(Parser)]
#[command(
    name = "issue-runner",
    version,
    about = "Run a coding agent against an issue in bounded, resumable chunks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Implement the issue, resuming the agent session across chunks.
    Implement {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        issue: IssueArgs,
        /// Override `max_chunks` from the config file.
        #[arg(long)]
        max_chunks: Option<u32>,
        /// Override `turns_per_chunk` from the config file.
        #[arg(long)]
        turns_per_chunk: Option<u32>,
        /// Skip the summary sub-agent.
        #[arg(long)]
        no_summaries: bool,
        /// Exit with code 2 when the chunk budget runs out.
        #[arg(long)]
        strict: bool,
    },
    /// Write an implementation plan without editing code.
    Plan {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        issue: IssueArgs,
    },
    /// Write `.pr-description.md` from the issue and the current diff.
    DescribePr {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        issue: IssueArgs,
        /// Diff text; computed from `git diff <base>` plus untracked files when unset.
        #[arg(long, env = "GIT_DIFF", hide_env_values = true)]
        diff: Option<String>,
        #[arg(long, default_value = "HEAD")]
        base: String,
    },
    /// Write a default `.issue-runner.toml`.
    Init {
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Working directory the agent edits (defaults to the current directory).
    #[arg(long)]
    workdir: Option<PathBuf>,
    /// Config file (defaults to `<workdir>/.issue-runner.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct IssueArgs {
    #[arg(long, env = "ISSUE_TITLE")]
    title: Option<String>,
    #[arg(long, env = "ISSUE_BODY", hide_env_values = true)]
    body: Option<String>,
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
    /// `owner/repo`.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repo: Option<String>,
    #[arg(long, env = "ISSUE_NUMBER")]
    issue_number: Option<u64>,
}

/// Resolved inputs shared by the agent commands.
struct RunContext {
    workdir: PathBuf,
    config: RunnerConfig,
    task: Task,
    github: Option<GithubClient>,
    issue_number: Option<u64>,
}

impl RunContext {
    fn notifier(&self) -> Option<GithubNotifier> {
        let client = self.github.clone()?;
        Some(GithubNotifier::new(client, self.issue_number?))
    }

    fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new(self.config.prompt_budget_bytes)
            .with_tools(&self.config.agent.allowed_tools)
    }

    fn allowed_tools(&self) -> Option<Vec<String>> {
        Some(self.config.agent.allowed_tools.clone()).filter(|t| !t.is_empty())
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Implement {
            common,
            issue,
            max_chunks,
            turns_per_chunk,
            no_summaries,
            strict,
        } => {
            let mut ctx = resolve(&common, issue).await?;
            if let Some(n) = max_chunks {
                ctx.config.max_chunks = n;
            }
            if let Some(n) = turns_per_chunk {
                ctx.config.turns_per_chunk = n;
            }
            if no_summaries {
                ctx.config.summaries = false;
            }
            ctx.config.validate()?;
            cmd_implement(&ctx, strict).await
        }
        Command::Plan { common, issue } => {
            let ctx = resolve(&common, issue).await?;
            cmd_plan(&ctx).await
        }
        Command::DescribePr {
            common,
            issue,
            diff,
            base,
        } => {
            let ctx = resolve(&common, issue).await?;
            cmd_describe(&ctx, diff, &base).await
        }
        Command::Init { workdir, force } => {
            let workdir = resolve_workdir(workdir.as_deref())?;
            let path = init_config(&workdir, force)?;
            eprintln!("wrote {}", path.display());
            Ok(exit_codes::OK)
        }
    }
}

async fn cmd_implement(ctx: &RunContext, strict: bool) -> Result<i32> {
    let runner = ClaudeSessionRunner::from_config(&ctx.config.agent);
    let signal = MarkerFile::completion(&ctx.workdir);
    let progress: Box<dyn ProgressReporter> = match ctx.notifier() {
        Some(notifier) => {
            Box::new(CommentProgress::new(notifier).with_git(Git::new(&ctx.workdir)))
        }
        None => Box::new(NoopProgress),
    };

    let outcome = run_chunked(
        &ctx.task,
        &ctx.workdir,
        Collaborators {
            runner: &runner,
            signal: &signal,
            progress: progress.as_ref(),
        },
        &ctx.prompts(),
        &ChunkedConfig::from_runner_config(&ctx.config),
        echo,
    )
    .await?;

    println!(
        "{}",
        json!({
            "type": "run_result",
            "stop": outcome.stop,
            "chunks_run": outcome.chunks_run,
            "session_id": outcome.session_id,
            "summaries": outcome.summaries,
            "final_summary": outcome.final_summary,
        })
    );
    info!(stop = %outcome.stop, chunks_run = outcome.chunks_run, "implement finished");
    if strict && outcome.stop == RunStop::Exhausted {
        return Ok(exit_codes::EXHAUSTED);
    }
    Ok(exit_codes::OK)
}

async fn cmd_plan(ctx: &RunContext) -> Result<i32> {
    let runner = ClaudeSessionRunner::from_config(&ctx.config.agent);
    let budget = ArtifactBudget {
        max_turns: ctx.config.plan_turns,
        allowed_tools: ctx.allowed_tools(),
    };
    let outcome = run_plan(&ctx.task, &ctx.workdir, &runner, &ctx.prompts(), &budget, echo).await?;

    println!(
        "{}",
        json!({ "type": "plan_result", "plan": outcome.plan })
    );
    if let Some(notifier) = ctx.notifier() {
        notifier
            .post(&render_plan_comment(outcome.plan.as_deref()))
            .await;
    }
    Ok(exit_codes::OK)
}

async fn cmd_describe(ctx: &RunContext, diff: Option<String>, base: &str) -> Result<i32> {
    let diff = resolve_diff(diff, &Git::new(&ctx.workdir), base)?;
    let runner = ClaudeSessionRunner::from_config(&ctx.config.agent);
    let budget = ArtifactBudget {
        max_turns: ctx.config.pr_description_turns,
        allowed_tools: ctx.allowed_tools(),
    };
    let outcome = run_describe(
        &ctx.task,
        &diff,
        &ctx.workdir,
        &runner,
        &ctx.prompts(),
        &budget,
        echo,
    )
    .await?;

    println!(
        "{}",
        json!({ "type": "pr_description_result", "description": outcome.description })
    );
    Ok(exit_codes::OK)
}

fn echo(message: &AgentMessage) {
    println!("{}", message.to_json_line());
}

/// Validate inputs in the order CI reports them: API key, config, then task.
async fn resolve(common: &CommonArgs, issue: IssueArgs) -> Result<RunContext> {
    if issue.api_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
        return Err(anyhow!("ANTHROPIC_API_KEY environment variable is required"));
    }

    let workdir = resolve_workdir(common.workdir.as_deref())?;
    let config_path = common
        .config
        .clone()
        .unwrap_or_else(|| workdir.join(CONFIG_FILE));
    let config = load_config(&config_path)?;

    let github = match (nonempty(issue.github_token.as_deref()), nonempty(issue.repo.as_deref())) {
        (Some(token), Some(repo)) => Some(GithubClient::new(
            &config.github.api_base,
            token,
            RepoRef::parse(repo)?,
            Duration::from_secs(config.github.request_timeout_secs),
        )?),
        _ => None,
    };

    let task = match nonempty(issue.title.as_deref()) {
        Some(title) => Task::new(title, issue.body.unwrap_or_default())?,
        None => fetch_task(github.as_ref(), issue.issue_number).await?,
    };

    Ok(RunContext {
        workdir,
        config,
        task,
        github,
        issue_number: issue.issue_number,
    })
}

/// Fall back to the issue itself when `ISSUE_TITLE` is not provided.
async fn fetch_task(github: Option<&GithubClient>, issue_number: Option<u64>) -> Result<Task> {
    let (Some(client), Some(number)) = (github, issue_number) else {
        return Err(anyhow!("ISSUE_TITLE environment variable is required"));
    };
    warn!(issue_number = number, "ISSUE_TITLE unset; fetching issue from GitHub");
    let issue = client
        .get_issue(number)
        .await
        .with_context(|| format!("fetch issue #{number}"))?;
    Ok(Task::new(issue.title, issue.body.unwrap_or_default())?)
}

fn resolve_workdir(workdir: Option<&Path>) -> Result<PathBuf> {
    let dir = match workdir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("read current directory")?,
    };
    dir.canonicalize()
        .with_context(|| format!("resolve working directory {}", dir.display()))
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
