//! Side-effecting adapters used by the agent loop.

pub mod completion;
pub mod config;
pub mod environment;
pub mod executor;
pub mod git;
pub mod process;
pub mod prompt;
