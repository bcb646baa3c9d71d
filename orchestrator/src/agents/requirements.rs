//! Requirements writer: vision document in, PRP out.

use anyhow::Result;

use crate::agents::{Agent, AgentContext, AgentEffects, FileWrite, ProcessingError, require_output};
use crate::core::state_update::StateMutation;
use crate::core::transition::{AgentOutcome, after_agent};
use crate::core::types::{AgentKind, ArtifactKind, ProjectState};
use crate::core::version::next_doc_version;
use crate::io::project_files::{PRP_PATH, VISION_PATH};
use crate::io::prompt::{PromptInputs, render_prompt};

pub struct RequirementsAgent<'a> {
    ctx: &'a AgentContext<'a>,
}

impl<'a> RequirementsAgent<'a> {
    pub fn new(ctx: &'a AgentContext<'a>) -> Self {
        Self { ctx }
    }
}

impl Agent for RequirementsAgent<'_> {
    fn kind(&self) -> AgentKind {
        AgentKind::Requirements
    }

    fn build_prompt(&self, state: &ProjectState) -> Result<String> {
        let inputs = PromptInputs {
            vision: self.ctx.files.read_artifact(VISION_PATH)?,
            prp: self.ctx.files.read_artifact(PRP_PATH)?,
            ..self.ctx.prompt_inputs(state)
        };
        render_prompt(self.kind(), &inputs)
    }

    fn process_output(
        &self,
        raw: &str,
        state: &ProjectState,
    ) -> Result<AgentEffects, ProcessingError> {
        let prp = require_output(raw)?;
        Ok(AgentEffects {
            file_writes: vec![FileWrite::new(PRP_PATH, prp)],
            mutations: vec![StateMutation::SetVersion {
                artifact: ArtifactKind::Prp,
                version: next_doc_version(state.version_of(ArtifactKind::Prp)),
            }],
            transition: after_agent(AgentOutcome::RequirementsWritten),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Phase;
    use crate::test_support::TestProject;

    #[test]
    fn writes_trimmed_prp_and_bumps_minor_version() {
        let project = TestProject::new("reqs");
        let ctx = project.agent_context();
        let agent = RequirementsAgent::new(&ctx);

        let mut state = ProjectState::new("reqs");
        state.version.insert("prp".to_string(), "1.4".to_string());
        let effects = agent
            .process_output("\n# PRP\n\nGoals...\n\n", &state)
            .expect("effects");

        assert_eq!(effects.file_writes, vec![FileWrite::new("prp/prp.md", "# PRP\n\nGoals...")]);
        assert_eq!(
            effects.mutations,
            vec![StateMutation::SetVersion {
                artifact: ArtifactKind::Prp,
                version: "1.5".to_string(),
            }]
        );
        assert_eq!(effects.transition.next_phase, Some(Phase::Development));
        assert_eq!(effects.transition.next_actor.as_str(), "dev_agent");
    }

    #[test]
    fn blank_output_is_rejected() {
        let project = TestProject::new("reqs");
        let ctx = project.agent_context();
        let err = RequirementsAgent::new(&ctx)
            .process_output("  \n\t", &ProjectState::new("reqs"))
            .unwrap_err();
        assert_eq!(err, ProcessingError::EmptyOutput);
    }

    #[test]
    fn prompt_uses_vision_and_meta_project_id() {
        let project = TestProject::new("dir-name");
        project.write("prp/vision.md", "A tiny URL shortener");
        let ctx = project.agent_context();

        let mut state = ProjectState::new("shortener");
        state.meta.project_id = Some("shortener".to_string());
        let prompt = RequirementsAgent::new(&ctx)
            .build_prompt(&state)
            .expect("prompt");
        assert!(prompt.contains("Project ID: shortener"));
        assert!(prompt.contains("A tiny URL shortener"));

        state.meta.project_id = None;
        let prompt = RequirementsAgent::new(&ctx)
            .build_prompt(&state)
            .expect("prompt");
        assert!(prompt.contains("Project ID: dir-name"));
    }
}
