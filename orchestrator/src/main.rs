//! `factory`: drive one project through the software factory phases.
//!
//! `run` executes a single agent against a project's state record. The other
//! commands are the human side of the workflow: inspect, unblock, approve,
//! reject, or move a project by hand.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestrator::agents::{AgentContext, build_agent};
use orchestrator::core::budget::{check_limit, truncate_to_token_limit};
use orchestrator::core::state_update::{
    clear_blocked, update_actors, update_last_event, update_phase,
};
use orchestrator::core::transition::{self, default_actor, on_approve, on_reject};
use orchestrator::core::types::{AgentKind, EventResult, HUMAN, ProjectState};
use orchestrator::exit_codes;
use orchestrator::io::clock::{Clock, SystemClock};
use orchestrator::io::config::{DEFAULT_CONFIG_PATH, FactoryConfig, load_config};
use orchestrator::io::profiles::ConfigError;
use orchestrator::io::state_store::{StateError, StateStore};
use orchestrator::logging;
use orchestrator::run::{self, prepare};

#[derive(Parser)]
#[command(
    name = "factory",
    version,
    about = "Phase-driven software factory orchestrator"
)]
struct Cli {
    /// Orchestrator config (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug-level diagnostics on stderr (unless RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent (prp, dev, test, doc) against a project.
    Run {
        project: String,
        agent: AgentKind,
        /// LLM profile to use instead of the project's or the default one.
        #[arg(long)]
        profile: Option<String>,
        /// Resolve config, load state and build the prompt without calling the LLM.
        #[arg(long)]
        dry_run: bool,
        /// With --dry-run: print the prompt, cut to the profile's context window.
        #[arg(long, requires = "dry_run")]
        show_prompt: bool,
        /// Run even though the project is blocked.
        #[arg(long)]
        force: bool,
    },
    /// Print phase, actors, blocking, versions and the last event.
    Status { project: String },
    /// Clear the blocked flag after a failed run.
    Unblock { project: String },
    /// Accept the validated build (human_validation -> release).
    Approve { project: String },
    /// Send the work back to development.
    Reject {
        project: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Move a project to a phase by hand.
    SetPhase { project: String, phase: String },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match dispatch(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(exit_code_for(&err));
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_codes::CONFIG;
        }
        if let Some(StateError::NotFound { .. }) = cause.downcast_ref::<StateError>() {
            return exit_codes::STATE_MISSING;
        }
    }
    exit_codes::AGENT_FAILED
}

fn dispatch(cli: Cli) -> Result<i32> {
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:#}", err);
            return Ok(exit_codes::CONFIG);
        }
    };
    match cli.command {
        Command::Run {
            project,
            agent,
            profile,
            dry_run: true,
            show_prompt,
            ..
        } => cmd_dry_run(&config, &project, agent, profile.as_deref(), show_prompt),
        Command::Run {
            project,
            agent,
            profile,
            force,
            ..
        } => cmd_run(&config, &project, agent, profile.as_deref(), force),
        Command::Status { project } => cmd_status(&config, &project),
        Command::Unblock { project } => cmd_unblock(&config, &project),
        Command::Approve { project } => cmd_approve(&config, &project),
        Command::Reject { project, reason } => cmd_reject(&config, &project, reason.as_deref()),
        Command::SetPhase { project, phase } => cmd_set_phase(&config, &project, &phase),
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn cmd_run(
    config: &FactoryConfig,
    project: &str,
    agent: AgentKind,
    profile: Option<&str>,
    force: bool,
) -> Result<i32> {
    if !force
        && let Ok(state) = StateStore::new(&config.projects_dir).load(project)
        && state.blocking.is_blocked
    {
        eprintln!(
            "{project} is blocked ({}); run `factory unblock {project}` or pass --force",
            state.blocking.detail.as_deref().unwrap_or("no detail")
        );
        return Ok(exit_codes::AGENT_FAILED);
    }
    let result = run::run(config, project, agent, profile, env_lookup)?;
    if result.success {
        println!("{}", result.message);
        if let Some(model) = &result.model {
            println!("model: {model}");
        }
        return Ok(exit_codes::OK);
    }
    eprintln!("{}", result.message);
    if result.is_state_not_found() {
        Ok(exit_codes::STATE_MISSING)
    } else {
        Ok(exit_codes::AGENT_FAILED)
    }
}

fn cmd_dry_run(
    config: &FactoryConfig,
    project: &str,
    agent: AgentKind,
    profile: Option<&str>,
    show_prompt: bool,
) -> Result<i32> {
    let state = load_state(config, project)?;
    let setup = prepare(config, project, agent, profile, env_lookup)?;
    let clock = SystemClock;
    let ctx = AgentContext {
        project_name: project.to_string(),
        files: setup.files.clone(),
        system_prompt: setup.system_prompt.clone(),
        checker: &setup.checker,
        clock: &clock,
    };
    let prompt = build_agent(agent, &ctx)
        .build_prompt(&state)
        .with_context(|| format!("build {agent} prompt"))?;
    let profile = &setup.settings.profile;
    let budget = check_limit(&prompt, profile.max_context_tokens, profile.max_output_tokens);

    println!("project: {project}");
    println!("phase: {}", state.phase);
    println!("actor: {}", state.actors.current);
    println!("awaiting_human: {}", state.actors.awaiting_human);
    println!("agent: {}", agent.agent_id());
    println!("provider: {}", profile.provider);
    println!("model: {}", profile.model);
    println!(
        "prompt_tokens: {} / {} (max output {})",
        budget.prompt_tokens, budget.max_context_tokens, budget.effective_max_output
    );
    if let Some(warning) = &budget.warning {
        println!("warning: {warning}");
    }
    if show_prompt {
        println!();
        println!("{}", truncate_to_token_limit(&prompt, profile.max_context_tokens));
    }
    Ok(exit_codes::OK)
}

fn cmd_status(config: &FactoryConfig, project: &str) -> Result<i32> {
    let state = load_state(config, project)?;
    println!("project: {project}");
    println!("phase: {}", state.phase);
    println!("actor: {}", state.actors.current);
    println!("awaiting_human: {}", state.actors.awaiting_human);
    if let Some(next) = &state.next_action {
        println!("next: {} ({})", next.action, next.agent);
    }
    if state.blocking.is_blocked {
        println!(
            "blocked: {} since {}",
            state.blocking.reason.as_deref().unwrap_or("unknown"),
            state.blocking.since.as_deref().unwrap_or("-")
        );
        if let Some(detail) = &state.blocking.detail {
            println!("  {detail}");
        }
    } else {
        println!("blocked: no");
    }
    for (artifact, version) in &state.version {
        println!("version.{artifact}: {version}");
    }
    if let Some(rate) = state.health.test_pass_rate {
        println!("test_pass_rate: {:.1}%", rate * 100.0);
    }
    println!("revision_count: {}", state.health.revision_count);
    if let Some(event) = &state.last_event {
        println!(
            "last_event: {} {} [{}] at {}",
            event.agent,
            event.action,
            match event.result {
                EventResult::Success => "success",
                EventResult::Failure => "failure",
            },
            event.timestamp
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_unblock(config: &FactoryConfig, project: &str) -> Result<i32> {
    let mut state = load_state(config, project)?;
    if !state.blocking.is_blocked {
        println!("{project} is not blocked");
        return Ok(exit_codes::OK);
    }
    clear_blocked(&mut state);
    save_state(config, project, &state)?;
    println!("{project} unblocked");
    Ok(exit_codes::OK)
}

fn cmd_approve(config: &FactoryConfig, project: &str) -> Result<i32> {
    let mut state = load_state(config, project)?;
    let transition = match on_approve(&state) {
        Ok(transition) => transition,
        Err(err) => {
            eprintln!("{err}");
            return Ok(exit_codes::AGENT_FAILED);
        }
    };
    transition::apply(&mut state, &transition);
    record_human_event(&mut state, "approved validation");
    save_state(config, project, &state)?;
    println!("{project}: phase {}", state.phase);
    Ok(exit_codes::OK)
}

fn cmd_reject(config: &FactoryConfig, project: &str, reason: Option<&str>) -> Result<i32> {
    let mut state = load_state(config, project)?;
    let transition = match on_reject(&state, reason) {
        Ok(transition) => transition,
        Err(err) => {
            eprintln!("{err}");
            return Ok(exit_codes::AGENT_FAILED);
        }
    };
    transition::apply(&mut state, &transition);
    let action = match reason {
        Some(reason) => format!("rejected: {reason}"),
        None => "rejected".to_string(),
    };
    record_human_event(&mut state, &action);
    save_state(config, project, &state)?;
    println!(
        "{project}: phase {}, revision {}",
        state.phase, state.health.revision_count
    );
    Ok(exit_codes::OK)
}

fn cmd_set_phase(config: &FactoryConfig, project: &str, phase: &str) -> Result<i32> {
    let mut state = load_state(config, project)?;
    update_phase(&mut state, phase)?;
    let actor = default_actor(state.phase);
    update_actors(&mut state, actor.as_str(), actor.is_human());
    let action = format!("set phase to {}", state.phase);
    record_human_event(&mut state, &action);
    save_state(config, project, &state)?;
    println!("{project}: phase {}, actor {}", state.phase, actor.as_str());
    Ok(exit_codes::OK)
}

fn record_human_event(state: &mut ProjectState, action: &str) {
    let timestamp = SystemClock.timestamp();
    update_last_event(state, HUMAN, action, EventResult::Success, None, &timestamp);
}

fn load_state(config: &FactoryConfig, project: &str) -> Result<ProjectState> {
    StateStore::new(&config.projects_dir)
        .load(project)
        .with_context(|| format!("load state for {project}"))
}

fn save_state(config: &FactoryConfig, project: &str, state: &ProjectState) -> Result<()> {
    StateStore::new(&config.projects_dir)
        .save(project, state)
        .with_context(|| format!("save state for {project}"))
}
