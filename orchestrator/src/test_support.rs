//! Test-only doubles and project scaffolding.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::agents::AgentContext;
use crate::core::budget::check_limit;
use crate::core::types::{Phase, ProjectState};
use crate::io::clock::Clock;
use crate::io::llm::{LlmCallResult, LlmClient};
use crate::io::project_files::ProjectFiles;
use crate::io::state_store::StateStore;
use crate::io::syntax_check::{CheckOutcome, SyntaxChecker};

pub const TEST_MODEL: &str = "scripted-model";

/// Clock pinned to 2025-01-02 03:04:05 UTC unless told otherwise.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
                .single()
                .unwrap_or_default(),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Checker that passes every file except the listed project-relative paths.
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    extension: String,
    failing: Vec<PathBuf>,
    checked: RefCell<Vec<PathBuf>>,
}

impl ScriptedChecker {
    pub fn passing(extension: &str) -> Self {
        Self::failing_on(extension, &[])
    }

    pub fn failing_on(extension: &str, failing: &[&str]) -> Self {
        Self {
            extension: extension.to_string(),
            failing: failing.iter().map(PathBuf::from).collect(),
            checked: RefCell::new(Vec::new()),
        }
    }

    pub fn checked(&self) -> Vec<PathBuf> {
        self.checked.borrow().clone()
    }
}

impl SyntaxChecker for ScriptedChecker {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn check(&self, path: &Path) -> CheckOutcome {
        self.checked.borrow_mut().push(path.to_path_buf());
        if self.failing.iter().any(|failing| path.ends_with(failing)) {
            CheckOutcome::Fail {
                stderr: format!("SyntaxError: invalid syntax ({})", path.display()),
            }
        } else {
            CheckOutcome::Pass
        }
    }
}

/// LLM double that replays queued replies and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedLlm {
    pub fn replying(content: &str) -> Self {
        let llm = Self::default();
        llm.push_reply(content);
        llm
    }

    pub fn failing(error: &str) -> Self {
        let llm = Self::default();
        llm.replies.borrow_mut().push_back(Err(error.to_string()));
        llm
    }

    pub fn push_reply(&self, content: &str) {
        self.replies.borrow_mut().push_back(Ok(content.to_string()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl LlmClient for ScriptedLlm {
    fn call(&self, prompt: &str) -> LlmCallResult {
        self.prompts.borrow_mut().push(prompt.to_string());
        let token_info = check_limit(prompt, 1_000_000, 4096);
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply left".to_string()));
        match reply {
            Ok(content) => LlmCallResult {
                success: true,
                content,
                model: TEST_MODEL.to_string(),
                error: None,
                token_info,
            },
            Err(error) => LlmCallResult {
                success: false,
                content: String::new(),
                model: TEST_MODEL.to_string(),
                error: Some(error),
                token_info,
            },
        }
    }

    fn model(&self) -> &str {
        TEST_MODEL
    }
}

/// A throwaway projects directory holding one project.
pub struct TestProject {
    temp: TempDir,
    name: String,
    checker: ScriptedChecker,
    clock: FixedClock,
}

impl TestProject {
    /// Project directory without a state record.
    pub fn new(name: &str) -> Self {
        let temp = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let project = Self {
            temp,
            name: name.to_string(),
            checker: ScriptedChecker::passing("py"),
            clock: FixedClock::default(),
        };
        fs::create_dir_all(project.root())
            .unwrap_or_else(|err| panic!("create project dir: {err}"));
        project
    }

    /// Project with a fresh state record in `phase`.
    pub fn with_phase(name: &str, phase: Phase) -> Self {
        let project = Self::new(name);
        let mut state = ProjectState::new(name);
        state.phase = phase;
        project.save_state(&state);
        project
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn projects_dir(&self) -> &Path {
        self.temp.path()
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join(&self.name)
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.projects_dir())
    }

    pub fn files(&self) -> ProjectFiles {
        ProjectFiles::new(self.root())
    }

    pub fn state(&self) -> ProjectState {
        self.store()
            .load(&self.name)
            .unwrap_or_else(|err| panic!("load state: {err}"))
    }

    pub fn save_state(&self, state: &ProjectState) {
        self.store()
            .save(&self.name, state)
            .unwrap_or_else(|err| panic!("save state: {err}"));
    }

    pub fn write(&self, relative: &str, contents: &str) {
        self.files()
            .write_artifact(relative, contents)
            .unwrap_or_else(|err| panic!("write {relative}: {err}"));
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        self.files()
            .read_artifact(relative)
            .unwrap_or_else(|err| panic!("read {relative}: {err}"))
    }

    pub fn clock(&self) -> &FixedClock {
        &self.clock
    }

    /// Agent context with a passing `py` checker and the fixed clock.
    pub fn agent_context(&self) -> AgentContext<'_> {
        self.agent_context_with(&self.checker)
    }

    pub fn agent_context_with<'a>(&'a self, checker: &'a dyn SyntaxChecker) -> AgentContext<'a> {
        AgentContext {
            project_name: self.name.clone(),
            files: self.files(),
            system_prompt: "SYSTEM PROMPT".to_string(),
            checker,
            clock: &self.clock,
        }
    }
}
