//! Run an external coding agent against an issue in bounded, resumable chunks.
//!
//! The agent runtime caps the number of turns per invocation. This crate
//! makes a long task look continuous: it runs the agent in chunks that resume
//! one session, stops when the agent writes a completion marker, and reports
//! progress back to the issue tracker.
//!
//! - **[`core`]**: Pure, deterministic logic (task validation, the message
//!   model, resume-token capture, transcript and comment rendering).
//! - **[`io`]**: Side-effecting operations (config, prompts, marker files,
//!   the agent subprocess, GitHub, git). Isolated behind traits so tests can
//!   script them.
//!
//! Orchestration modules ([`chunked`], [`plan`], [`describe`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod artifact;
pub mod chunked;
pub mod core;
pub mod describe;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod progress;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
