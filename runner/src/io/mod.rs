//! I/O adapters: config, prompts, marker files, the agent process, GitHub, git.

pub mod config;
pub mod git;
pub mod github;
pub mod marker;
pub mod notifier;
pub mod prompt;
pub mod session;
