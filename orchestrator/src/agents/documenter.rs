//! Documenter: architecture docs from PRP, sources and the last test report.

use anyhow::Result;

use crate::agents::{Agent, AgentContext, AgentEffects, FileWrite, ProcessingError, require_output};
use crate::core::state_update::StateMutation;
use crate::core::transition::{AgentOutcome, after_agent};
use crate::core::types::{AgentKind, ArtifactKind, ProjectState};
use crate::core::version::next_doc_version;
use crate::io::project_files::{DOCS_PATH, PRP_PATH, TEST_RESULTS_PATH};
use crate::io::prompt::{PromptInputs, render_prompt};

pub struct DocumenterAgent<'a> {
    ctx: &'a AgentContext<'a>,
}

impl<'a> DocumenterAgent<'a> {
    pub fn new(ctx: &'a AgentContext<'a>) -> Self {
        Self { ctx }
    }
}

impl Agent for DocumenterAgent<'_> {
    fn kind(&self) -> AgentKind {
        AgentKind::Documenter
    }

    fn build_prompt(&self, state: &ProjectState) -> Result<String> {
        let inputs = PromptInputs {
            prp: self.ctx.files.read_artifact(PRP_PATH)?,
            source_files: self.ctx.files.source_files(None),
            test_results: self.ctx.files.read_artifact(TEST_RESULTS_PATH)?,
            ..self.ctx.prompt_inputs(state)
        };
        render_prompt(self.kind(), &inputs)
    }

    fn process_output(
        &self,
        raw: &str,
        state: &ProjectState,
    ) -> Result<AgentEffects, ProcessingError> {
        let docs = require_output(raw)?;
        Ok(AgentEffects {
            file_writes: vec![FileWrite::new(DOCS_PATH, docs)],
            mutations: vec![StateMutation::SetVersion {
                artifact: ArtifactKind::Docs,
                version: next_doc_version(state.version_of(ArtifactKind::Docs)),
            }],
            transition: after_agent(AgentOutcome::DocsWritten),
        })
    }
}
