//! Prompt assembly: system prompt resolution plus per-kind minijinja templates.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

use crate::core::types::AgentKind;
use crate::io::project_files::{PROMPT_OVERRIDES_DIR, SourceFile};

const HEADER_TEMPLATE: &str = include_str!("prompts/header.md");
const PRP_TEMPLATE: &str = include_str!("prompts/prp.md");
const DEV_TEMPLATE: &str = include_str!("prompts/dev.md");
const TEST_TEMPLATE: &str = include_str!("prompts/test.md");
const DOC_TEMPLATE: &str = include_str!("prompts/doc.md");

const PRP_SYSTEM: &str = include_str!("prompts/system/prp_agent.md");
const DEV_SYSTEM: &str = include_str!("prompts/system/dev_agent.md");
const TEST_SYSTEM: &str = include_str!("prompts/system/test_agent.md");
const DOC_SYSTEM: &str = include_str!("prompts/system/doc_agent.md");

/// Everything a prompt template may reference. Kinds use the subset they need.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptInputs {
    pub system_prompt: String,
    pub project_id: String,
    pub vision: Option<String>,
    pub prp: Option<String>,
    pub source_files: Vec<SourceFile>,
    pub test_results: Option<String>,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in [
            ("header", HEADER_TEMPLATE),
            ("prp", PRP_TEMPLATE),
            ("dev", DEV_TEMPLATE),
            ("test", TEST_TEMPLATE),
            ("doc", DOC_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, kind: AgentKind, inputs: &PromptInputs) -> Result<String> {
        let template = self.env.get_template(kind.short_name())?;
        let rendered = template
            .render(inputs)
            .with_context(|| format!("render {} prompt", kind.short_name()))?;
        Ok(rendered)
    }
}

pub fn render_prompt(kind: AgentKind, inputs: &PromptInputs) -> Result<String> {
    let prompt = PromptEngine::new().render(kind, inputs)?;
    debug!(agent = %kind, chars = prompt.chars().count(), "rendered prompt");
    Ok(prompt)
}

/// Built-in system prompt for `kind`.
pub fn default_system_prompt(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Requirements => PRP_SYSTEM,
        AgentKind::Developer => DEV_SYSTEM,
        AgentKind::Tester => TEST_SYSTEM,
        AgentKind::Documenter => DOC_SYSTEM,
    }
}

/// Resolve the system prompt: project override, then the global template
/// directory, then the built-in default. Blank files are ignored.
pub fn load_system_prompt(
    kind: AgentKind,
    project_root: &Path,
    templates_dir: &Path,
) -> Result<String> {
    let file_name = format!("{}_agent.md", kind.short_name());
    let candidates = [
        project_root.join(PROMPT_OVERRIDES_DIR).join(&file_name),
        templates_dir.join(&file_name),
    ];
    for path in &candidates {
        if !path.is_file() {
            continue;
        }
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        if !text.trim().is_empty() {
            debug!(agent = %kind, path = %path.display(), "using system prompt file");
            return Ok(text.trim_end().to_string());
        }
    }
    Ok(default_system_prompt(kind).trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> PromptInputs {
        PromptInputs {
            system_prompt: "SYSTEM".to_string(),
            project_id: "hello".to_string(),
            ..PromptInputs::default()
        }
    }

    #[test]
    fn every_prompt_starts_with_system_prompt_and_project_info() {
        for kind in AgentKind::ALL {
            let prompt = render_prompt(kind, &inputs()).expect("render");
            assert!(prompt.starts_with("SYSTEM\n\n---\n\n## Project Information\n"));
            assert!(prompt.contains("Project ID: hello"));
        }
    }

    #[test]
    fn requirements_prompt_without_vision_asks_for_one() {
        let prompt = render_prompt(AgentKind::Requirements, &inputs()).expect("render");
        assert!(prompt.contains("No vision document found. Please create prp/vision.md first."));
        assert!(!prompt.contains("Existing PRP"));
        assert!(prompt.contains("## Task"));
    }

    #[test]
    fn requirements_prompt_embeds_vision_and_existing_prp() {
        let prompt = render_prompt(
            AgentKind::Requirements,
            &PromptInputs {
                vision: Some("A todo app".to_string()),
                prp: Some("# PRP v1".to_string()),
                ..inputs()
            },
        )
        .expect("render");
        assert!(prompt.contains("## Vision Document\n```\nA todo app\n```"));
        assert!(prompt.contains("# PRP v1"));
    }

    #[test]
    fn developer_prompt_without_prp_is_an_error_instruction() {
        let prompt = render_prompt(AgentKind::Developer, &inputs()).expect("render");
        assert!(prompt.contains("ERROR: No PRP document found. Cannot generate code without PRP."));
        assert!(!prompt.contains("## Task"));
    }

    #[test]
    fn developer_prompt_lists_existing_code_and_file_format() {
        let prompt = render_prompt(
            AgentKind::Developer,
            &PromptInputs {
                prp: Some("build it".to_string()),
                source_files: vec![SourceFile {
                    path: "src/main.py".to_string(),
                    content: "print('hi')".to_string(),
                }],
                ..inputs()
            },
        )
        .expect("render");
        assert!(prompt.contains("### src/main.py\n```\nprint('hi')\n```"));
        assert!(prompt.contains("### FILE: src/filename.py"));
    }

    #[test]
    fn tester_prompt_notes_missing_sources() {
        let prompt = render_prompt(AgentKind::Tester, &inputs()).expect("render");
        assert!(prompt.contains("No source code found in src/"));
        assert!(prompt.contains("Generate test specifications"));
    }

    #[test]
    fn documenter_prompt_includes_test_results() {
        let prompt = render_prompt(
            AgentKind::Documenter,
            &PromptInputs {
                test_results: Some("- Passed: 2".to_string()),
                ..inputs()
            },
        )
        .expect("render");
        assert!(prompt.contains("## Test Results\n```\n- Passed: 2\n```"));
        assert!(prompt.contains("Architecture diagram (text-based)"));
    }

    #[test]
    fn system_prompt_resolution_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = temp.path().join("project");
        let templates = temp.path().join("templates");

        let builtin =
            load_system_prompt(AgentKind::Developer, &project, &templates).expect("builtin");
        assert_eq!(builtin, DEV_SYSTEM.trim_end());

        fs::create_dir_all(&templates).expect("mkdir");
        fs::write(templates.join("dev_agent.md"), "global dev\n").expect("write");
        let global = load_system_prompt(AgentKind::Developer, &project, &templates).expect("global");
        assert_eq!(global, "global dev");

        let overrides = project.join(PROMPT_OVERRIDES_DIR);
        fs::create_dir_all(&overrides).expect("mkdir");
        fs::write(overrides.join("dev_agent.md"), "   \n").expect("write");
        let blank_override =
            load_system_prompt(AgentKind::Developer, &project, &templates).expect("blank");
        assert_eq!(blank_override, "global dev");

        fs::write(overrides.join("dev_agent.md"), "project dev").expect("write");
        let project_override =
            load_system_prompt(AgentKind::Developer, &project, &templates).expect("override");
        assert_eq!(project_override, "project dev");
    }
}
