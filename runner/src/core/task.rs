//! The task an agent run works on.

use std::fmt;

/// Issue-derived task description. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub title: String,
    /// May be empty; prompts omit the body section entirely in that case.
    pub body: String,
}

impl Task {
    /// Build a validated task.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Result<Self, InvalidTaskError> {
        let task = Self {
            title: title.into(),
            body: body.into(),
        };
        task.validate()?;
        Ok(task)
    }

    /// Reject tasks without a usable title.
    pub fn validate(&self) -> Result<(), InvalidTaskError> {
        if self.title.trim().is_empty() {
            return Err(InvalidTaskError {
                reason: "title must not be empty",
            });
        }
        Ok(())
    }

    pub fn title(&self) -> &str {
        self.title.trim()
    }

    /// Trimmed body, or `None` when there is nothing to show.
    pub fn body(&self) -> Option<&str> {
        Some(self.body.trim()).filter(|body| !body.is_empty())
    }
}

/// A task could not be turned into a prompt. Raised before any agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTaskError {
    pub reason: &'static str,
}

impl fmt::Display for InvalidTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task: {}", self.reason)
    }
}

impl std::error::Error for InvalidTaskError {}
