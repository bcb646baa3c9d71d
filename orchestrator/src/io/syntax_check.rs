//! Syntax-only validation of generated source files via an external checker.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, warn};

use crate::io::config::SyntaxCheckConfig;
use crate::io::process::run_command_with_timeout;

/// Result of checking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    /// Checker exited non-zero.
    Fail { stderr: String },
    Timeout,
    /// Checker could not be run at all.
    Error { message: String },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Pass => "PASS",
            CheckOutcome::Fail { .. } => "FAIL",
            CheckOutcome::Timeout => "TIMEOUT",
            CheckOutcome::Error { .. } => "ERROR",
        }
    }
}

pub trait SyntaxChecker {
    /// Bare extension of the files this checker validates (`py`).
    fn extension(&self) -> &str;
    fn check(&self, path: &Path) -> CheckOutcome;
}

/// Runs `<command...> <file>` per file, sequentially, with a per-file timeout.
#[derive(Debug, Clone)]
pub struct CommandSyntaxChecker {
    command: Vec<String>,
    extension: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandSyntaxChecker {
    pub fn new(
        command: Vec<String>,
        extension: impl Into<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            command,
            extension: extension.into(),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &SyntaxCheckConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.extension.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }
}

impl SyntaxChecker for CommandSyntaxChecker {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn check(&self, path: &Path) -> CheckOutcome {
        let Some((program, args)) = self.command.split_first() else {
            return CheckOutcome::Error {
                message: "empty syntax check command".to_string(),
            };
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(path);

        let outcome = match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Err(err) => CheckOutcome::Error {
                message: format!("{err:#}"),
            },
            Ok(output) if output.timed_out => CheckOutcome::Timeout,
            Ok(output) if output.status.success() => CheckOutcome::Pass,
            Ok(output) => CheckOutcome::Fail {
                stderr: output.stderr_lossy(),
            },
        };
        if outcome.passed() {
            debug!(path = %path.display(), "syntax check passed");
        } else {
            warn!(path = %path.display(), outcome = outcome.label(), "syntax check failed");
        }
        outcome
    }
}
