//! Stable exit codes for `factory` commands.

/// Command succeeded (for `run`: the agent completed successfully).
pub const OK: i32 = 0;
/// The agent run failed and the project is now blocked, or the command failed
/// for any other reason (checkpoint not applicable, invalid state record).
pub const AGENT_FAILED: i32 = 1;
/// Configuration could not be loaded or resolved (unknown profile, missing
/// API key, invalid `factory.toml`).
pub const CONFIG: i32 = 2;
/// The project has no state record.
pub const STATE_MISSING: i32 = 3;
