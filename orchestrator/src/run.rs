//! The run protocol, identical for every agent kind.
//!
//! 1. Load state; a missing record ends the run with `state_not_found` and no
//!    other side effect.
//! 2. Build the prompt and call the LLM once.
//! 3. Process the output into effects, write files, mutate and route state.
//!
//! Every outcome after step 1 persists the state exactly once and appends one
//! line to the project's run log. Failures mark the project blocked.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::agents::{Agent, AgentContext, build_agent};
use crate::core::state_update::{apply_mutation, set_blocked, update_last_event};
use crate::core::transition;
use crate::core::types::{AgentKind, BlockKind, EventResult, Phase, ProjectState};
use crate::io::clock::{Clock, SystemClock};
use crate::io::config::FactoryConfig;
use crate::io::llm::{LlmClient, LlmGateway, ReqwestTransport};
use crate::io::profiles::{LlmSettings, load_registry, resolve_llm_settings};
use crate::io::project_files::{PROJECT_LLM_CONFIG_PATH, ProjectFiles, RUN_LOG_PATH};
use crate::io::prompt::load_system_prompt;
use crate::io::run_log::{RunRecord, append_run_record};
use crate::io::state_store::{StateError, StateStore};
use crate::io::syntax_check::CommandSyntaxChecker;

/// `error` value of a run against a project without a state record.
pub const STATE_NOT_FOUND: &str = "state_not_found";

/// What the caller of `run` gets back. Exactly one per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRunResult {
    pub success: bool,
    pub message: String,
    pub model: Option<String>,
    pub error: Option<String>,
}

impl AgentRunResult {
    fn state_not_found(err: &StateError, model: Option<String>) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            model,
            error: Some(STATE_NOT_FOUND.to_string()),
        }
    }

    pub fn is_state_not_found(&self) -> bool {
        self.error.as_deref() == Some(STATE_NOT_FOUND)
    }
}

struct Failure {
    block: BlockKind,
    action: String,
    message: String,
    error: String,
}

/// Collaborators for executing one agent against one project.
pub struct Runner<'a> {
    pub store: &'a StateStore,
    pub files: &'a ProjectFiles,
    pub llm: &'a dyn LlmClient,
    pub clock: &'a dyn Clock,
}

impl Runner<'_> {
    #[instrument(skip_all, fields(project = project_id, agent = %agent.kind()))]
    pub fn run(&self, project_id: &str, agent: &dyn Agent) -> Result<AgentRunResult> {
        let mut state = match self.store.load(project_id) {
            Ok(state) => state,
            Err(err @ StateError::NotFound { .. }) => {
                info!(error = %err, "no state record; nothing to run");
                return Ok(AgentRunResult::state_not_found(
                    &err,
                    Some(self.llm.model().to_string()),
                ));
            }
            Err(err) => return Err(err).context("load project state"),
        };
        let kind = agent.kind();
        let phase_before = state.phase;
        info!(phase = %phase_before, "agent run started");

        let prompt = match agent.build_prompt(&state) {
            Ok(prompt) => prompt,
            Err(err) => {
                let failure = Failure {
                    block: BlockKind::PromptBuild,
                    action: format!("{} prompt build failed", kind.short_name()),
                    message: format!("Prompt build failed: {err:#}"),
                    error: format!("{err:#}"),
                };
                let model = self.llm.model().to_string();
                return self.record_failure(project_id, state, phase_before, kind, &model, failure);
            }
        };
        let reply = self.llm.call(&prompt);
        let model = reply.model.clone();
        if !reply.success {
            let error = reply
                .error
                .unwrap_or_else(|| "LLM call failed without an error message".to_string());
            let failure = Failure {
                block: BlockKind::Transport,
                action: format!("{} generation failed", kind.short_name()),
                message: format!("LLM call failed: {error}"),
                error,
            };
            return self.record_failure(project_id, state, phase_before, kind, &model, failure);
        }

        let effects = match agent.process_output(&reply.content, &state) {
            Ok(effects) => effects,
            Err(err) => {
                let failure = Failure {
                    block: BlockKind::OutputProcessing,
                    action: format!("{} output processing failed", kind.short_name()),
                    message: format!("Output processing failed: {err}"),
                    error: err.to_string(),
                };
                return self.record_failure(project_id, state, phase_before, kind, &model, failure);
            }
        };

        let mut written = Vec::with_capacity(effects.file_writes.len());
        for write in &effects.file_writes {
            if let Err(err) = self.files.write_artifact(&write.path, &write.content) {
                let failure = Failure {
                    block: BlockKind::FileWrite,
                    action: format!("{} file write failed", kind.short_name()),
                    message: format!("File write failed: {err:#}"),
                    error: format!("{err:#}"),
                };
                return self.record_failure(project_id, state, phase_before, kind, &model, failure);
            }
            written.push(write.path.clone());
        }

        for mutation in &effects.mutations {
            apply_mutation(&mut state, mutation);
        }
        transition::apply(&mut state, &effects.transition);
        let timestamp = self.clock.timestamp();
        update_last_event(
            &mut state,
            kind.agent_id(),
            &format!("{} completed successfully", kind.short_name()),
            EventResult::Success,
            Some(&model),
            &timestamp,
        );
        self.store
            .save(project_id, &state)
            .context("save project state")?;
        info!(
            phase = %state.phase,
            next = %state.actors.current,
            files = written.len(),
            "agent run succeeded"
        );

        self.append_log(RunRecord {
            timestamp,
            project: project_id.to_string(),
            agent: kind.agent_id().to_string(),
            result: EventResult::Success,
            model: Some(model.clone()),
            phase_before,
            phase_after: state.phase,
            failure: None,
            error: None,
            files_written: written,
        });

        Ok(AgentRunResult {
            success: true,
            message: format!("{} completed successfully", kind.agent_id()),
            model: Some(model),
            error: None,
        })
    }

    fn record_failure(
        &self,
        project_id: &str,
        mut state: ProjectState,
        phase_before: Phase,
        kind: AgentKind,
        model: &str,
        failure: Failure,
    ) -> Result<AgentRunResult> {
        let timestamp = self.clock.timestamp();
        update_last_event(
            &mut state,
            kind.agent_id(),
            &failure.action,
            EventResult::Failure,
            Some(model),
            &timestamp,
        );
        set_blocked(&mut state, failure.block, &failure.error, &timestamp);
        self.store
            .save(project_id, &state)
            .context("save project state")?;
        warn!(kind = ?failure.block, error = %failure.error, "agent run failed; project blocked");

        self.append_log(RunRecord {
            timestamp,
            project: project_id.to_string(),
            agent: kind.agent_id().to_string(),
            result: EventResult::Failure,
            model: Some(model.to_string()),
            phase_before,
            phase_after: state.phase,
            failure: Some(failure.block),
            error: Some(failure.error.clone()),
            files_written: Vec::new(),
        });

        Ok(AgentRunResult {
            success: false,
            message: failure.message,
            model: Some(model.to_string()),
            error: Some(failure.error),
        })
    }

    fn append_log(&self, record: RunRecord) {
        let path = self.files.path_of(RUN_LOG_PATH);
        if let Err(err) = append_run_record(&path, &record) {
            warn!(path = %path.display(), error = %format!("{err:#}"), "could not append run log");
        }
    }
}

/// Everything resolved from configuration before a run touches state or the
/// network.
pub struct RunSetup {
    pub store: StateStore,
    pub files: ProjectFiles,
    pub settings: LlmSettings,
    pub system_prompt: String,
    pub checker: CommandSyntaxChecker,
}

/// Resolve profile, API key, system prompt and syntax checker for a run.
pub fn prepare<F>(
    config: &FactoryConfig,
    project_id: &str,
    kind: AgentKind,
    profile_override: Option<&str>,
    env: F,
) -> Result<RunSetup>
where
    F: Fn(&str) -> Option<String>,
{
    let store = StateStore::new(&config.projects_dir);
    let project_dir = store.project_dir(project_id)?;
    let registry = load_registry(&config.profiles_path)?;
    let settings = resolve_llm_settings(
        &registry,
        &project_dir.join(PROJECT_LLM_CONFIG_PATH),
        profile_override,
        env,
    )?;
    info!(
        profile = settings.profile_name.as_deref().unwrap_or("<project>"),
        provider = %settings.profile.provider,
        model = %settings.profile.model,
        "resolved llm profile"
    );
    let system_prompt = load_system_prompt(kind, &project_dir, &config.templates_dir)?;
    Ok(RunSetup {
        store,
        files: ProjectFiles::new(project_dir),
        settings,
        system_prompt,
        checker: CommandSyntaxChecker::from_config(&config.syntax_check),
    })
}

/// Run `kind` against `project_id` with the real gateway and checker.
///
/// A missing state record is reported before configuration is resolved, so
/// it always yields `state_not_found`. Configuration problems are `Err`.
pub fn run<F>(
    config: &FactoryConfig,
    project_id: &str,
    kind: AgentKind,
    profile_override: Option<&str>,
    env: F,
) -> Result<AgentRunResult>
where
    F: Fn(&str) -> Option<String>,
{
    let store = StateStore::new(&config.projects_dir);
    if let Err(err @ StateError::NotFound { .. }) = store.load(project_id) {
        info!(project = project_id, error = %err, "no state record; nothing to run");
        return Ok(AgentRunResult::state_not_found(&err, None));
    }

    let setup = prepare(config, project_id, kind, profile_override, env)?;
    let gateway = LlmGateway::new(setup.settings, ReqwestTransport::new()?, config.llm_timeout());
    let clock = SystemClock;
    let ctx = AgentContext {
        project_name: project_id.to_string(),
        files: setup.files.clone(),
        system_prompt: setup.system_prompt,
        checker: &setup.checker,
        clock: &clock,
    };
    let agent = build_agent(kind, &ctx);
    Runner {
        store: &setup.store,
        files: &setup.files,
        llm: &gateway,
        clock: &clock,
    }
    .run(project_id, agent.as_ref())
}
