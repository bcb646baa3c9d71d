//! Side-effecting helpers for the orchestrator.

pub mod clock;
pub mod config;
pub mod llm;
pub mod process;
pub mod profiles;
pub mod project_files;
pub mod prompt;
pub mod run_log;
pub mod state_store;
pub mod syntax_check;
