//! Tester: test specs from the LLM, pass/fail from a syntax check of `src/`.

use anyhow::Result;

use crate::agents::{Agent, AgentContext, AgentEffects, FileWrite, ProcessingError, require_output};
use crate::core::state_update::StateMutation;
use crate::core::transition::{AgentOutcome, after_agent};
use crate::core::types::{AgentKind, ProjectState};
use crate::io::project_files::{PRP_PATH, TEST_RESULTS_PATH, TEST_SPECS_PATH};
use crate::io::prompt::{PromptInputs, render_prompt};
use crate::io::syntax_check::CheckOutcome;

/// Source extensions shown to the LLM when asking for test specs.
pub const PROMPT_SOURCE_EXTENSIONS: [&str; 4] = ["py", "js", "ts", "sh"];

const STDERR_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub passed: usize,
    pub failed: usize,
}

impl TestSummary {
    pub fn from_results(results: &[(String, CheckOutcome)]) -> Self {
        let passed = results.iter().filter(|(_, outcome)| outcome.passed()).count();
        Self {
            passed,
            failed: results.len() - passed,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    /// `passed / total`, or 0.0 when nothing was checked.
    pub fn pass_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.passed as f64 / total as f64,
        }
    }
}

/// Markdown report written to `reports/test_results.md`.
pub fn render_report(project: &str, date: &str, results: &[(String, CheckOutcome)]) -> String {
    let summary = TestSummary::from_results(results);
    let mut out = format!("# Test Results\nProject: {project}\nDate: {date}\n\n");
    for (path, outcome) in results {
        let label = outcome.label();
        match outcome {
            CheckOutcome::Pass => out.push_str(&format!("- {label}: {path} - Syntax OK\n")),
            CheckOutcome::Fail { stderr } => {
                let excerpt: String = stderr.chars().take(STDERR_EXCERPT_CHARS).collect();
                out.push_str(&format!("- {label}: {path} - Syntax Error\n"));
                out.push_str(&format!("  Error: {}\n", excerpt.trim_end()));
            }
            CheckOutcome::Timeout => out.push_str(&format!("- {label}: {path}\n")),
            CheckOutcome::Error { message } => {
                out.push_str(&format!("- {label}: {path} - {message}\n"));
            }
        }
    }
    out.push_str("\n## Summary\n");
    out.push_str(&format!("- Total: {}\n", summary.total()));
    out.push_str(&format!("- Passed: {}\n", summary.passed));
    out.push_str(&format!("- Failed: {}\n", summary.failed));
    if summary.total() > 0 {
        out.push_str(&format!("- Pass Rate: {:.1}%\n", summary.pass_rate() * 100.0));
    }
    out
}

pub struct TesterAgent<'a> {
    ctx: &'a AgentContext<'a>,
}

impl<'a> TesterAgent<'a> {
    pub fn new(ctx: &'a AgentContext<'a>) -> Self {
        Self { ctx }
    }

    fn check_sources(&self) -> Vec<(String, CheckOutcome)> {
        let checker = self.ctx.checker;
        self.ctx
            .files
            .source_paths_with_extension(checker.extension())
            .into_iter()
            .map(|(relative, absolute)| {
                let outcome = checker.check(&absolute);
                (relative, outcome)
            })
            .collect()
    }
}

impl Agent for TesterAgent<'_> {
    fn kind(&self) -> AgentKind {
        AgentKind::Tester
    }

    fn build_prompt(&self, state: &ProjectState) -> Result<String> {
        let inputs = PromptInputs {
            prp: self.ctx.files.read_artifact(PRP_PATH)?,
            source_files: self.ctx.files.source_files(Some(PROMPT_SOURCE_EXTENSIONS.as_slice())),
            ..self.ctx.prompt_inputs(state)
        };
        render_prompt(self.kind(), &inputs)
    }

    fn process_output(
        &self,
        raw: &str,
        _state: &ProjectState,
    ) -> Result<AgentEffects, ProcessingError> {
        let specs = require_output(raw)?;
        let results = self.check_sources();
        let summary = TestSummary::from_results(&results);
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            "syntax checks finished"
        );
        let report = render_report(&self.ctx.project_name, &self.ctx.clock.report_date(), &results);

        Ok(AgentEffects {
            file_writes: vec![
                FileWrite::new(TEST_SPECS_PATH, specs),
                FileWrite::new(TEST_RESULTS_PATH, report),
            ],
            mutations: vec![StateMutation::SetTestPassRate(summary.pass_rate())],
            transition: after_agent(AgentOutcome::TestsRan {
                passed: summary.passed,
                failed: summary.failed,
            }),
        })
    }
}
