//! Shared deterministic types for the chunked controller.
//!
//! These types define the contract between the controller and its
//! collaborators (progress reporters, the CLI). They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a chunked run stopped. Both variants are successful returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStop {
    /// The agent signalled completion through the completion marker.
    Done,
    /// `max_chunks` ran without the marker appearing.
    Exhausted,
}

impl RunStop {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStop::Done => "done",
            RunStop::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for RunStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted after every chunk's message stream is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// 0-based chunk index.
    pub index: u32,
    pub max_chunks: u32,
    /// Turn ceiling handed to the agent for this chunk.
    pub turn_budget: u32,
    pub message_count: usize,
    /// Short progress note from the summary sub-agent, if one was produced.
    pub summary: Option<String>,
}

/// Emitted exactly once when a run reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFinish {
    pub stop: RunStop,
    pub chunks_run: u32,
    /// Per-chunk summaries in chunk order (chunks without a summary are skipped).
    pub summaries: Vec<String>,
    pub final_summary: Option<String>,
}
