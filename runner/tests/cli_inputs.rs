//! CLI tests for required inputs and `init`.
//!
//! Spawns the binary and verifies exit codes without ever reaching the agent.

use std::process::Command;

use issue_runner::exit_codes;
use issue_runner::io::config::{CONFIG_FILE, RunnerConfig, load_config};

fn runner(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_issue-runner"));
    cmd.current_dir(dir)
        .env_remove("ISSUE_TITLE")
        .env_remove("ISSUE_BODY")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("ISSUE_NUMBER")
        .env_remove("GIT_DIFF");
    cmd
}

#[test]
fn missing_api_key_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = runner(temp.path())
        .arg("implement")
        .env("ISSUE_TITLE", "Add logging")
        .output()
        .expect("issue-runner implement");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ANTHROPIC_API_KEY"));
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_title_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    for subcommand in ["implement", "plan", "describe-pr"] {
        for title in [None, Some("   ")] {
            let mut cmd = runner(temp.path());
            cmd.arg(subcommand)
                .env("ANTHROPIC_API_KEY", "test-key")
                .env("ISSUE_BODY", "body only")
                .env("GIT_DIFF", "+x");
            if let Some(title) = title {
                cmd.env("ISSUE_TITLE", title);
            }
            let output = cmd.output().expect("issue-runner");

            let stderr = String::from_utf8_lossy(&output.stderr);
            assert_eq!(
                output.status.code(),
                Some(exit_codes::INVALID),
                "{subcommand}: {stderr}"
            );
            assert!(stderr.contains("ISSUE_TITLE"), "{subcommand}: {stderr}");
        }
    }
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join(CONFIG_FILE), "max_chunks = 0\n").expect("config");
    let output = runner(temp.path())
        .arg("implement")
        .env("ANTHROPIC_API_KEY", "test-key")
        .env("ISSUE_TITLE", "Add logging")
        .output()
        .expect("issue-runner implement");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_chunks"));
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = runner(temp.path()).arg("init").status().expect("init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join(CONFIG_FILE)).expect("load");
    assert_eq!(cfg, RunnerConfig::default());

    let status = runner(temp.path()).arg("init").status().expect("init again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = runner(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}
