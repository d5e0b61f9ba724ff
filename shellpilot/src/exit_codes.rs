//! Stable exit codes for shellpilot CLI commands.

/// The agent reported the task complete, or a non-run command succeeded.
pub const OK: i32 = 0;
/// Invalid usage or configuration (bad flags, unreadable config, missing API key).
pub const INVALID: i32 = 1;
/// The iteration budget ran out before the agent reported completion.
pub const EXHAUSTED: i32 = 2;
/// The completion service failed; the run was aborted.
pub const FAILED: i32 = 3;
