//! Plain-text rendering of a chunk's message log for the summary sub-agent.

use super::message::{AgentMessage, MessageKind};

const MAX_TEXT_CHARS: usize = 600;

/// Render `messages` as one line per meaningful event, keeping the most recent
/// lines that fit within `budget_bytes`.
pub fn render_transcript(messages: &[AgentMessage], budget_bytes: usize) -> String {
    let lines: Vec<String> = messages.iter().flat_map(message_lines).collect();

    let mut kept = Vec::new();
    let mut used = 0usize;
    for line in lines.iter().rev() {
        let cost = line.len() + 1;
        if used + cost > budget_bytes {
            break;
        }
        used += cost;
        kept.push(line.as_str());
    }
    kept.reverse();

    let omitted = lines.len() - kept.len();
    let mut out = String::new();
    if omitted > 0 {
        out.push_str(&format!("[... {omitted} earlier lines omitted]\n"));
    }
    out.push_str(&kept.join("\n"));
    out
}

fn message_lines(message: &AgentMessage) -> Vec<String> {
    match &message.kind {
        MessageKind::Init { model, .. } => vec![match model {
            Some(model) => format!("[session] started (model {model})"),
            None => "[session] started".to_string(),
        }],
        MessageKind::Assistant { text, tool_uses } => {
            let mut lines = Vec::new();
            if !text.is_empty() {
                lines.push(format!(
                    "[assistant] {}",
                    truncate_chars(&text.replace('\n', " "), MAX_TEXT_CHARS)
                ));
            }
            for tool in tool_uses {
                lines.push(match &tool.target {
                    Some(target) => format!("[tool] {} {}", tool.name, target),
                    None => format!("[tool] {}", tool.name),
                });
            }
            lines
        }
        MessageKind::ToolResult { is_error: true } => vec!["[tool] error".to_string()],
        MessageKind::ToolResult { is_error: false } => Vec::new(),
        MessageKind::Result {
            subtype,
            result,
            num_turns,
            ..
        } => {
            let turns = num_turns.map(|n| format!(" turns={n}")).unwrap_or_default();
            let text = result
                .as_deref()
                .map(|r| format!(": {}", truncate_chars(&r.replace('\n', " "), MAX_TEXT_CHARS)))
                .unwrap_or_default();
            vec![format!("[result] {subtype}{turns}{text}")]
        }
        MessageKind::Unrecognized { .. } => Vec::new(),
    }
}

/// Final answer of a short, tool-free invocation.
///
/// Prefers the terminal result text; falls back to the assistant's prose.
/// Error results yield `None`.
pub fn reply_text(messages: &[AgentMessage]) -> Option<String> {
    let mut assistant = Vec::new();
    for message in messages {
        match &message.kind {
            MessageKind::Result { is_error: true, .. } => return None,
            MessageKind::Result {
                result: Some(result),
                ..
            } if !result.trim().is_empty() => return Some(result.trim().to_string()),
            MessageKind::Assistant { text, .. } if !text.is_empty() => assistant.push(text.as_str()),
            _ => {}
        }
    }
    Some(assistant.join("\n\n")).filter(|text| !text.is_empty())
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
