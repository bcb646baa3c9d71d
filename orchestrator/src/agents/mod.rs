//! The agent contract and the four pipeline agents.
//!
//! An agent turns project state into a prompt and turns the LLM's answer into
//! [`AgentEffects`]. Agents never write files or persist state themselves; the
//! runner applies them only when processing succeeded.

use anyhow::Result;

use crate::core::state_update::StateMutation;
use crate::core::transition::Transition;
use crate::core::types::{AgentKind, ProjectState};
use crate::io::clock::Clock;
use crate::io::project_files::ProjectFiles;
use crate::io::prompt::PromptInputs;
use crate::io::syntax_check::SyntaxChecker;

pub mod developer;
pub mod documenter;
pub mod requirements;
pub mod tester;

/// One project-relative file the runner should (over)write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

impl FileWrite {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything a successful `process_output` asks the runner to do.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEffects {
    pub file_writes: Vec<FileWrite>,
    pub mutations: Vec<StateMutation>,
    pub transition: Transition,
}

/// The LLM answer could not be turned into effects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    #[error("LLM returned empty output")]
    EmptyOutput,
    #[error("unsafe file path in LLM output: '{0}'")]
    UnsafePath(String),
    #[error("{0} is missing; nothing to build from")]
    MissingArtifact(&'static str),
}

/// Collaborators shared by every agent kind for one run.
pub struct AgentContext<'a> {
    /// Directory name of the project (fallback project id in prompts).
    pub project_name: String,
    pub files: ProjectFiles,
    pub system_prompt: String,
    pub checker: &'a dyn SyntaxChecker,
    pub clock: &'a dyn Clock,
}

impl AgentContext<'_> {
    fn prompt_inputs(&self, state: &ProjectState) -> PromptInputs {
        PromptInputs {
            system_prompt: self.system_prompt.clone(),
            project_id: state
                .meta
                .project_id
                .clone()
                .unwrap_or_else(|| self.project_name.clone()),
            ..PromptInputs::default()
        }
    }
}

pub trait Agent {
    fn kind(&self) -> AgentKind;

    /// Assemble the prompt from state and the project's artifacts.
    fn build_prompt(&self, state: &ProjectState) -> Result<String>;

    /// Turn raw LLM output into effects without writing to the project.
    ///
    /// Called on the same agent after `build_prompt`, with the reply to that
    /// prompt.
    fn process_output(
        &self,
        raw: &str,
        state: &ProjectState,
    ) -> Result<AgentEffects, ProcessingError>;
}

pub fn build_agent<'a>(kind: AgentKind, ctx: &'a AgentContext<'a>) -> Box<dyn Agent + 'a> {
    match kind {
        AgentKind::Requirements => Box::new(requirements::RequirementsAgent::new(ctx)),
        AgentKind::Developer => Box::new(developer::DeveloperAgent::new(ctx)),
        AgentKind::Tester => Box::new(tester::TesterAgent::new(ctx)),
        AgentKind::Documenter => Box::new(documenter::DocumenterAgent::new(ctx)),
    }
}

/// Trimmed output, or `EmptyOutput` when nothing is left.
fn require_output(raw: &str) -> Result<&str, ProcessingError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProcessingError::EmptyOutput);
    }
    Ok(trimmed)
}
