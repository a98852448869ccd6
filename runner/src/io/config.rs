//! Runner configuration stored in `.issue-runner.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config filename, relative to the working directory.
pub const CONFIG_FILE: &str = ".issue-runner.toml";

/// Runner configuration (TOML).
///
/// Missing fields default to the values CI runs have been tuned for, so an
/// absent file is equivalent to an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Upper bound on agent invocations per `implement` run.
    pub max_chunks: u32,

    /// Turn ceiling handed to the agent for each chunk.
    pub turns_per_chunk: u32,

    /// Turn ceiling for summary sub-agent invocations.
    pub summary_turns: u32,

    pub plan_turns: u32,

    pub pr_description_turns: u32,

    /// Run the summary sub-agent after each chunk and at the end of a run.
    pub summaries: bool,

    /// Prompts larger than this drop optional sections.
    pub prompt_budget_bytes: usize,

    /// Bytes of chunk transcript fed to the summary sub-agent.
    pub transcript_budget_bytes: usize,

    pub agent: AgentConfig,

    pub github: GithubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent CLI and any leading arguments (e.g. `["claude"]`).
    pub command: Vec<String>,
    pub model: Option<String>,
    pub permission_mode: String,
    /// Tools the implementation and planning agents may use.
    pub allowed_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
            model: None,
            permission_mode: "bypassPermissions".to_string(),
            allowed_tools: ["Read", "Edit", "Write", "Glob", "Grep"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_chunks: 5,
            turns_per_chunk: 10,
            summary_turns: 3,
            plan_turns: 10,
            pr_description_turns: 3,
            summaries: true,
            prompt_budget_bytes: 60_000,
            transcript_budget_bytes: 12_000,
            agent: AgentConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        let budgets = [
            ("max_chunks", self.max_chunks),
            ("turns_per_chunk", self.turns_per_chunk),
            ("summary_turns", self.summary_turns),
            ("plan_turns", self.plan_turns),
            ("pr_description_turns", self.pr_description_turns),
        ];
        for (name, value) in budgets {
            if value == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.transcript_budget_bytes == 0 {
            return Err(anyhow!("transcript_budget_bytes must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.github.request_timeout_secs == 0 {
            return Err(anyhow!("github.request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write the default config to `workdir`.
///
/// Fails if the file already exists unless `force` is set.
pub fn init_config(workdir: &Path, force: bool) -> Result<PathBuf> {
    let path = workdir.join(CONFIG_FILE);
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(&path, &RunnerConfig::default())?;
    Ok(path)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn write_then_load_preserves_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        let cfg = RunnerConfig {
            max_chunks: 2,
            agent: AgentConfig {
                model: Some("sonnet".to_string()),
                ..AgentConfig::default()
            },
            ..RunnerConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "turns_per_chunk = 25\n[github]\nrequest_timeout_secs = 5\n")
            .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.turns_per_chunk, 25);
        assert_eq!(cfg.github.request_timeout_secs, 5);
        assert_eq!(cfg.github.api_base, "https://api.github.com");
        assert_eq!(cfg.max_chunks, 5);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "max_chunks = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_chunks must be > 0"));
    }

    #[test]
    fn empty_agent_command_is_rejected() {
        let cfg = RunnerConfig {
            agent: AgentConfig {
                command: Vec::new(),
                ..AgentConfig::default()
            },
            ..RunnerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = init_config(temp.path(), false).expect("init");
        assert_eq!(load_config(&path).expect("load"), RunnerConfig::default());

        fs::write(&path, "max_chunks = 9\n").expect("edit");
        let err = init_config(temp.path(), false).expect_err("should refuse");
        assert!(err.to_string().contains("--force"));
        assert_eq!(load_config(&path).expect("load").max_chunks, 9);

        init_config(temp.path(), true).expect("force");
        assert_eq!(load_config(&path).expect("load").max_chunks, 5);
    }
}
