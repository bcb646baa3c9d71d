//! Phase-driven software factory orchestrator.
//!
//! A project moves through `prp -> development -> test -> human_validation`,
//! with one LLM-backed agent per step and a human at the validation
//! checkpoint. Every agent run follows the same protocol: load the YAML state
//! record, build a prompt, call the LLM once, turn the output into files and
//! state mutations, then route the project to its next phase and actor.
//!
//! - **[`core`]**: Pure logic (token budget, state mutations, version bumps,
//!   the phase transition policy). No I/O.
//! - **[`io`]**: Side effects (state store, LLM gateway, profiles, project
//!   files, syntax-check processes). Trait seams allow test doubles.
//! - **[`agents`]**: The four agent kinds, each a prompt builder plus an
//!   output processor.
//! - **[`run`]**: The run protocol that ties them together.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
