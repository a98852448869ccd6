//! Git adapter used to gather diffs and changed-file lists.
//!
//! A small, explicit wrapper around `git` subprocess calls in the working
//! directory. Nothing here mutates the repository.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::marker::{COMPLETION_MARKER, PLAN_FILE, PR_DESCRIPTION_FILE};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Paths touched in the working tree, excluding the runner's own artifacts.
    #[instrument(skip_all)]
    pub fn changed_paths(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .status_porcelain()?
            .into_iter()
            .map(|entry| entry.path)
            .filter(|path| !is_runner_artifact(path))
            .collect();
        paths.sort();
        paths.dedup();
        debug!(count = paths.len(), "collected changed paths");
        Ok(paths)
    }

    /// `git diff <base>` followed by a creation diff for every untracked file.
    ///
    /// Runner artifacts are left out. The index is never touched.
    #[instrument(skip_all, fields(base = %base))]
    pub fn diff(&self, base: &str) -> Result<String> {
        let mut diff = self.run_capture(&["diff", base])?;
        let untracked = self
            .status_porcelain()?
            .into_iter()
            .filter(|entry| entry.code == "??" && !is_runner_artifact(&entry.path));
        for entry in untracked {
            diff.push_str(&self.untracked_diff(&entry.path)?);
        }
        Ok(diff)
    }

    fn untracked_diff(&self, path: &str) -> Result<String> {
        let args = ["diff", "--no-index", "--", "/dev/null", path];
        let output = self.run(&args)?;
        // --no-index exits 1 when the inputs differ.
        if !output.status.success() && output.status.code() != Some(1) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn is_runner_artifact(path: &str) -> bool {
    [COMPLETION_MARKER, PLAN_FILE, PR_DESCRIPTION_FILE].contains(&path)
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: " M".to_string(),
                path: "src/main.rs".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn runner_artifacts_are_not_changes() {
        assert!(is_runner_artifact(".issue-runner-done"));
        assert!(is_runner_artifact(".pr-description.md"));
        assert!(!is_runner_artifact("src/.issue-runner-done"));
        assert!(!is_runner_artifact("src/lib.rs"));
    }

    #[test]
    fn changed_paths_and_diff_in_real_repo() {
        let repo = TestRepo::new().expect("repo");
        let root = repo.root();
        std::fs::write(root.join("README.md"), "hello\nworld\n").expect("edit");
        std::fs::write(root.join("new.txt"), "x").expect("write");
        std::fs::write(root.join(COMPLETION_MARKER), "DONE").expect("marker");

        let git = Git::new(root);
        assert_eq!(
            git.changed_paths().expect("paths"),
            vec!["README.md".to_string(), "new.txt".to_string()]
        );
        let diff = git.diff("HEAD").expect("diff");
        assert!(diff.contains("+world"), "{diff}");
        assert!(!diff.contains(COMPLETION_MARKER), "{diff}");
    }

    #[test]
    fn diff_includes_untracked_files() {
        let repo = TestRepo::new().expect("repo");
        let root = repo.root();
        std::fs::create_dir(root.join("src")).expect("mkdir");
        std::fs::write(root.join("src/added.rs"), "fn added() {}\n").expect("write");

        let git = Git::new(root);
        let diff = git.diff("HEAD").expect("diff");
        assert!(diff.contains("src/added.rs"), "{diff}");
        assert!(diff.contains("+fn added() {}"), "{diff}");
        assert_eq!(
            git.status_porcelain().expect("status")[0].code,
            "??",
            "diff must not stage the file"
        );
    }

    #[test]
    fn diff_against_unknown_base_fails() {
        let repo = TestRepo::new().expect("repo");
        let err = Git::new(repo.root())
            .diff("no-such-rev")
            .expect_err("should fail");
        assert!(format!("{err:#}").contains("git diff no-such-rev failed"));
    }
}
