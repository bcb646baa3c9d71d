//! Developer: PRP plus existing sources in, source files out.

use std::cell::Cell;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::agents::{Agent, AgentContext, AgentEffects, FileWrite, ProcessingError, require_output};
use crate::core::state_update::StateMutation;
use crate::core::transition::{AgentOutcome, after_agent};
use crate::core::types::{AgentKind, ArtifactKind, ProjectState};
use crate::core::version::next_code_version;
use crate::io::project_files::{DEFAULT_SOURCE_PATH, PRP_PATH, is_safe_relative_path};
use crate::io::prompt::{PromptInputs, render_prompt};

/// `### FILE: <path>` followed by a fenced block.
static FILE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)###\s*FILE:\s*(.+?)\n```\w*\n(.*?)```").expect("file block regex")
});

static PYTHON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\n(.*?)```").expect("python block regex"));

/// Split LLM output into files.
///
/// Tries `FILE:` blocks first, then a single python block, then the whole
/// output, the last two landing in `src/main.py`.
pub fn parse_files(raw: &str) -> Vec<FileWrite> {
    let blocks: Vec<FileWrite> = FILE_BLOCK_RE
        .captures_iter(raw)
        .map(|caps| FileWrite::new(caps[1].trim(), caps[2].trim()))
        .collect();
    if !blocks.is_empty() {
        return blocks;
    }
    let content = PYTHON_BLOCK_RE
        .captures(raw)
        .map_or_else(|| raw.trim(), |caps| caps.get(1).map_or("", |m| m.as_str()).trim());
    vec![FileWrite::new(DEFAULT_SOURCE_PATH, content)]
}

pub struct DeveloperAgent<'a> {
    ctx: &'a AgentContext<'a>,
    /// Whether the last `build_prompt` found a PRP. Output is only accepted
    /// for a prompt that was built from one.
    had_prp: Cell<bool>,
}

impl<'a> DeveloperAgent<'a> {
    pub fn new(ctx: &'a AgentContext<'a>) -> Self {
        Self {
            ctx,
            had_prp: Cell::new(false),
        }
    }
}

impl Agent for DeveloperAgent<'_> {
    fn kind(&self) -> AgentKind {
        AgentKind::Developer
    }

    fn build_prompt(&self, state: &ProjectState) -> Result<String> {
        let prp = self.ctx.files.read_artifact(PRP_PATH)?;
        self.had_prp.set(prp.is_some());
        // Without a PRP the template renders only the error instruction.
        let source_files = if prp.is_some() {
            self.ctx.files.source_files(None)
        } else {
            Vec::new()
        };
        let inputs = PromptInputs {
            prp,
            source_files,
            ..self.ctx.prompt_inputs(state)
        };
        render_prompt(self.kind(), &inputs)
    }

    fn process_output(
        &self,
        raw: &str,
        state: &ProjectState,
    ) -> Result<AgentEffects, ProcessingError> {
        if !self.had_prp.get() {
            return Err(ProcessingError::MissingArtifact(PRP_PATH));
        }
        let raw = require_output(raw)?;
        let file_writes = parse_files(raw);
        if let Some(bad) = file_writes.iter().find(|w| !is_safe_relative_path(&w.path)) {
            return Err(ProcessingError::UnsafePath(bad.path.clone()));
        }
        Ok(AgentEffects {
            file_writes,
            mutations: vec![StateMutation::SetVersion {
                artifact: ArtifactKind::Code,
                version: next_code_version(state.version_of(ArtifactKind::Code)),
            }],
            transition: after_agent(AgentOutcome::CodeWritten),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Phase;
    use crate::test_support::TestProject;

    const TWO_FILES: &str = "Here you go.\n\n### FILE: src/app.py\n```python\nimport util\n\nprint(util.x)\n```\n\n### FILE: src/util.py\n```\n  x = 1  \n```\nDone.";

    #[test]
    fn file_blocks_become_one_write_each() {
        let files = parse_files(TWO_FILES);
        assert_eq!(
            files,
            vec![
                FileWrite::new("src/app.py", "import util\n\nprint(util.x)"),
                FileWrite::new("src/util.py", "x = 1"),
            ]
        );
    }

    #[test]
    fn python_block_falls_back_to_main() {
        let files = parse_files("Sure:\n```python\nprint('hi')\n```\nbye");
        assert_eq!(files, vec![FileWrite::new("src/main.py", "print('hi')")]);
    }

    #[test]
    fn plain_text_becomes_main_verbatim() {
        let files = parse_files("\n  print('raw')\n");
        assert_eq!(files, vec![FileWrite::new("src/main.py", "print('raw')")]);
    }

    fn project_with_prp() -> TestProject {
        let project = TestProject::new("dev");
        project.write("prp/prp.md", "# PRP");
        project
    }

    fn prepared<'a>(ctx: &'a AgentContext<'a>) -> DeveloperAgent<'a> {
        let agent = DeveloperAgent::new(ctx);
        agent.build_prompt(&ProjectState::new("dev")).expect("prompt");
        agent
    }

    #[test]
    fn bumps_patch_and_hands_to_tester() {
        let project = project_with_prp();
        let ctx = project.agent_context();
        let mut state = ProjectState::new("dev");
        state.version.insert("code".to_string(), "1.2.3".to_string());

        let effects = prepared(&ctx)
            .process_output(TWO_FILES, &state)
            .expect("effects");
        assert_eq!(
            effects.mutations,
            vec![StateMutation::SetVersion {
                artifact: ArtifactKind::Code,
                version: "1.2.4".to_string(),
            }]
        );
        assert_eq!(effects.transition.next_phase, Some(Phase::Test));
        assert_eq!(effects.transition.next_actor.as_str(), "test_agent");
    }

    #[test]
    fn malformed_code_version_resets() {
        let project = project_with_prp();
        let ctx = project.agent_context();
        let mut state = ProjectState::new("dev");
        state.version.insert("code".to_string(), "v1-beta".to_string());

        let effects = prepared(&ctx)
            .process_output("print(1)", &state)
            .expect("effects");
        assert_eq!(
            effects.mutations,
            vec![StateMutation::SetVersion {
                artifact: ArtifactKind::Code,
                version: "0.1.0".to_string(),
            }]
        );
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let project = project_with_prp();
        let ctx = project.agent_context();
        let raw = "### FILE: ../../etc/cron.d/x\n```\nboom\n```\n";
        let err = prepared(&ctx)
            .process_output(raw, &ProjectState::new("dev"))
            .unwrap_err();
        assert_eq!(err, ProcessingError::UnsafePath("../../etc/cron.d/x".to_string()));
    }

    #[test]
    fn missing_prp_yields_no_files() {
        let project = TestProject::new("dev");
        let ctx = project.agent_context();
        let agent = DeveloperAgent::new(&ctx);
        let state = ProjectState::new("dev");

        let prompt = agent.build_prompt(&state).expect("prompt");
        assert!(prompt.contains("ERROR: No PRP document found."));
        assert_eq!(
            agent.process_output("print(1)", &state).unwrap_err(),
            ProcessingError::MissingArtifact("prp/prp.md")
        );
    }

    #[test]
    fn prp_presence_is_decided_when_the_prompt_is_built() {
        let project = TestProject::new("dev");
        let ctx = project.agent_context();
        let state = ProjectState::new("dev");

        let without = DeveloperAgent::new(&ctx);
        without.build_prompt(&state).expect("prompt");
        project.write("prp/prp.md", "# PRP written mid-run");
        assert_eq!(
            without.process_output("print(1)", &state).unwrap_err(),
            ProcessingError::MissingArtifact("prp/prp.md")
        );

        let with = DeveloperAgent::new(&ctx);
        with.build_prompt(&state).expect("prompt");
        std::fs::remove_file(project.root().join("prp/prp.md")).expect("remove prp");
        assert!(with.process_output("print(1)", &state).is_ok());
    }

    #[test]
    fn prompt_includes_existing_sources() {
        let project = project_with_prp();
        project.write("src/main.py", "print('old')");
        let ctx = project.agent_context();
        let prompt = DeveloperAgent::new(&ctx)
            .build_prompt(&ProjectState::new("dev"))
            .expect("prompt");
        assert!(prompt.contains("### src/main.py"));
        assert!(prompt.contains("print('old')"));
    }
}
