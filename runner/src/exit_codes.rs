//! Stable exit codes for `issue-runner` commands.

/// Command succeeded. `implement` also exits with this when the chunk budget
/// ran out, unless `--strict` is set.
pub const OK: i32 = 0;
/// Missing required inputs (API key, task title), invalid config, or any other error.
pub const INVALID: i32 = 1;
/// `issue-runner implement --strict` ran out of chunks without the completion marker.
pub const EXHAUSTED: i32 = 2;
