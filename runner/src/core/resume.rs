//! Resume-token capture across chunks.

use super::message::AgentMessage;

/// Tracks the session handle for one controller run.
///
/// The token is taken from the first token-bearing message of chunk 0 and
/// never replaced afterwards. Later chunks may start fresh sessions that
/// announce their own tokens; those are ignored so every resumed chunk
/// continues the original conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    token: Option<String>,
}

impl ResumeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a message from chunk `chunk_index`. Returns true when a token was captured.
    pub fn observe(&mut self, chunk_index: u32, message: &AgentMessage) -> bool {
        if chunk_index != 0 || self.token.is_some() {
            return false;
        }
        match message.session_token() {
            Some(token) => {
                self.token = Some(token.to_string());
                true
            }
            None => false,
        }
    }

    /// Token to hand to chunk `chunk_index`: always `None` for chunk 0.
    pub fn token_for(&self, chunk_index: u32) -> Option<&str> {
        if chunk_index == 0 {
            return None;
        }
        self.token.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init(id: &str) -> AgentMessage {
        AgentMessage::from_value(json!({"type": "system", "subtype": "init", "session_id": id}))
    }

    fn text(body: &str) -> AgentMessage {
        AgentMessage::from_value(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": body}]}
        }))
    }

    #[test]
    fn captures_first_token_of_first_chunk_only() {
        let mut state = ResumeState::new();
        assert!(!state.observe(0, &text("hello")));
        assert!(state.observe(0, &init("abc")));
        assert!(!state.observe(0, &init("second")));
        assert!(!state.observe(1, &init("later")));

        assert_eq!(state.token(), Some("abc"));
        assert_eq!(state.token_for(0), None);
        assert_eq!(state.token_for(1), Some("abc"));
        assert_eq!(state.token_for(7), Some("abc"));
    }

    #[test]
    fn tokens_outside_chunk_zero_are_ignored() {
        let mut state = ResumeState::new();
        assert!(!state.observe(1, &init("late")));
        assert_eq!(state.token_for(2), None);
    }
}
