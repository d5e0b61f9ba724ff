//! Autonomous shell-command agent.
//!
//! Given a natural-language task, the agent repeatedly asks a completion
//! service what to do next, validates and runs the proposed shell command,
//! and feeds the result back until the service reports completion or the
//! iteration budget runs out. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (reply parsing, safety checks,
//!   step history). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (config file, subprocesses, git,
//!   prompt templates, completion backends).
//!
//! [`looping`] ties them together into the task loop.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
