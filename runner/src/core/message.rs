//! Closed message model for the agent's stream-json protocol.
//!
//! Every line the agent emits is classified into one [`MessageKind`]. Shapes
//! we do not understand become [`MessageKind::Unrecognized`] instead of being
//! dropped, and the original JSON is kept in [`AgentMessage::raw`].

use anyhow::{Context, Result};
use serde_json::Value;

/// Tool invocation requested by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    pub name: String,
    /// Short description of the target (file path, pattern, command).
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// `type=system, subtype=init`: the only kind that carries a resume token.
    Init {
        session_id: String,
        model: Option<String>,
    },
    Assistant {
        text: String,
        tool_uses: Vec<ToolUse>,
    },
    /// `type=user` messages echo tool results back to the agent.
    ToolResult { is_error: bool },
    /// Terminal message of one agent invocation.
    Result {
        subtype: String,
        result: Option<String>,
        num_turns: Option<u32>,
        is_error: bool,
    },
    Unrecognized { kind: Option<String> },
}

/// One protocol message, classified, with its raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMessage {
    pub kind: MessageKind,
    pub raw: Value,
}

impl AgentMessage {
    /// Parse one line of stream-json output.
    pub fn from_line(line: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(line.trim()).context("parse agent message")?;
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        let kind = classify(&raw);
        Self { kind, raw }
    }

    /// Resume token, present only on `system/init` messages.
    pub fn session_token(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Init { session_id, .. } => Some(session_id.as_str()),
            _ => None,
        }
    }

    /// Compact single-line JSON for echoing to stdout.
    pub fn to_json_line(&self) -> String {
        self.raw.to_string()
    }
}

fn classify(raw: &Value) -> MessageKind {
    let kind = str_field(raw, "type");
    match kind {
        Some("system") if str_field(raw, "subtype") == Some("init") => {
            match str_field(raw, "session_id").filter(|id| !id.is_empty()) {
                Some(session_id) => MessageKind::Init {
                    session_id: session_id.to_string(),
                    model: str_field(raw, "model").map(str::to_string),
                },
                None => unrecognized(kind),
            }
        }
        Some("assistant") => classify_assistant(raw),
        Some("user") => MessageKind::ToolResult {
            is_error: content_blocks(raw).any(|block| {
                block.get("is_error").and_then(Value::as_bool) == Some(true)
            }),
        },
        Some("result") => MessageKind::Result {
            subtype: str_field(raw, "subtype").unwrap_or("unknown").to_string(),
            result: str_field(raw, "result").map(str::to_string),
            num_turns: raw
                .get("num_turns")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            is_error: raw.get("is_error").and_then(Value::as_bool).unwrap_or(false),
        },
        _ => unrecognized(kind),
    }
}

fn classify_assistant(raw: &Value) -> MessageKind {
    let mut texts = Vec::new();
    let mut tool_uses = Vec::new();
    for block in content_blocks(raw) {
        match str_field(block, "type") {
            Some("text") => {
                if let Some(text) = str_field(block, "text") {
                    texts.push(text.trim());
                }
            }
            Some("tool_use") => tool_uses.push(ToolUse {
                name: str_field(block, "name").unwrap_or("unknown").to_string(),
                target: block.get("input").and_then(tool_target),
            }),
            _ => {}
        }
    }
    MessageKind::Assistant {
        text: texts
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        tool_uses,
    }
}

fn tool_target(input: &Value) -> Option<String> {
    ["file_path", "path", "pattern", "command"]
        .iter()
        .find_map(|key| str_field(input, key))
        .map(str::to_string)
}

fn content_blocks(raw: &Value) -> impl Iterator<Item = &Value> {
    raw.get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn unrecognized(kind: Option<&str>) -> MessageKind {
    MessageKind::Unrecognized {
        kind: kind.map(str::to_string),
    }
}
