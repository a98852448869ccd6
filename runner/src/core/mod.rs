//! Deterministic logic with no I/O.

pub mod comment;
pub mod message;
pub mod resume;
pub mod task;
pub mod transcript;
pub mod types;
