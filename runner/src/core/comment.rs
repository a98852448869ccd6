//! Markdown bodies for progress comments posted to the issue tracker.

use super::types::{ChunkReport, RunFinish, RunStop};

const NO_SUMMARY: &str = "_No summary was produced for this chunk._";

pub fn render_chunk_comment(report: &ChunkReport) -> String {
    let summary = report
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_SUMMARY);
    format!(
        "### Progress update (chunk {}/{})\n\n{}\n\n_turn budget {} | messages {}_",
        report.index + 1,
        report.max_chunks,
        summary,
        report.turn_budget,
        report.message_count
    )
}

pub fn render_final_comment(finish: &RunFinish, changed_files: &[String]) -> String {
    let heading = match finish.stop {
        RunStop::Done => format!("## Task complete after {} chunk(s)", finish.chunks_run),
        RunStop::Exhausted => format!(
            "## Turn budget exhausted after {} chunk(s)\n\nThe agent did not signal completion. The work below may be partial; re-run to continue.",
            finish.chunks_run
        ),
    };

    let mut body = heading;
    if let Some(summary) = finish
        .final_summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        body.push_str("\n\n### Summary\n\n");
        body.push_str(summary);
    } else if !finish.summaries.is_empty() {
        body.push_str("\n\n### Chunk summaries\n");
        for (idx, summary) in finish.summaries.iter().enumerate() {
            body.push_str(&format!("\n{}. {}", idx + 1, summary.trim()));
        }
    }

    if !changed_files.is_empty() {
        body.push_str("\n\n### Files changed\n");
        for path in changed_files {
            body.push_str(&format!("\n- `{path}`"));
        }
    }
    body
}

pub fn render_plan_comment(plan: Option<&str>) -> String {
    match plan.map(str::trim).filter(|p| !p.is_empty()) {
        Some(plan) => format!("## Implementation plan\n\n{plan}"),
        None => "## Implementation plan\n\n_The agent finished without writing a plan._".to_string(),
    }
}
