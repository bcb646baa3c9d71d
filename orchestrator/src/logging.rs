//! Diagnostic tracing for the `factory` CLI.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted.
//! - **Run log (`io/run_log`)**: one JSON line per agent run in
//!   `reports/agent_runs.jsonl`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. `verbose` raises this crate to
/// `debug` unless `RUST_LOG` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestrator=debug factory run demo prp
/// ```
pub fn init(verbose: bool) {
    let fallback = if verbose { "warn,orchestrator=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
