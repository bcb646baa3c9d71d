//! Text artifacts inside one project directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

pub const VISION_PATH: &str = "prp/vision.md";
pub const PRP_PATH: &str = "prp/prp.md";
pub const SOURCE_DIR: &str = "src";
pub const DEFAULT_SOURCE_PATH: &str = "src/main.py";
pub const TEST_SPECS_PATH: &str = "tests/test_specs.md";
pub const TEST_RESULTS_PATH: &str = "reports/test_results.md";
pub const DOCS_PATH: &str = "docs/architecture.md";
pub const RUN_LOG_PATH: &str = "reports/agent_runs.jsonl";
pub const PROJECT_LLM_CONFIG_PATH: &str = "config/llm.yaml";
pub const PROMPT_OVERRIDES_DIR: &str = "agents/overrides";

/// A source file as shown to the LLM. `path` is project-relative with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// A relative path that stays inside the directory it is joined to.
pub fn is_safe_relative_path(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: PathBuf,
}

impl ProjectFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Read an artifact; `None` when it does not exist.
    pub fn read_artifact(&self, relative: &str) -> Result<Option<String>> {
        let path = self.path_of(relative);
        if !path.is_file() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(contents))
    }

    /// Overwrite an artifact, creating parent directories.
    pub fn write_artifact(&self, relative: &str, contents: &str) -> Result<()> {
        if !is_safe_relative_path(relative) {
            bail!("refusing to write outside the project: {relative}");
        }
        let path = self.path_of(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(())
    }

    /// Every readable UTF-8 file under `src/`, optionally filtered by
    /// extension, sorted by path. Unreadable files are skipped.
    pub fn source_files(&self, extensions: Option<&[&str]>) -> Vec<SourceFile> {
        self.source_paths()
            .into_iter()
            .filter(|(_, abs)| extensions.is_none_or(|exts| has_extension(abs, exts)))
            .filter_map(|(relative, abs)| match fs::read_to_string(&abs) {
                Ok(content) => Some(SourceFile {
                    path: relative,
                    content,
                }),
                Err(err) => {
                    debug!(path = %abs.display(), error = %err, "skipping unreadable source file");
                    None
                }
            })
            .collect()
    }

    /// `(relative, absolute)` paths of source files with extension `ext`.
    pub fn source_paths_with_extension(&self, ext: &str) -> Vec<(String, PathBuf)> {
        self.source_paths()
            .into_iter()
            .filter(|(_, abs)| has_extension(abs, &[ext]))
            .collect()
    }

    /// Regular files under `src/`, any depth. A missing `src/` lists nothing.
    fn source_paths(&self) -> Vec<(String, PathBuf)> {
        let mut paths: Vec<(String, PathBuf)> = WalkDir::new(self.root.join(SOURCE_DIR))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let abs = entry.into_path();
                let relative = abs.strip_prefix(&self.root).ok()?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                Some((relative, abs))
            })
            .collect();
        paths.sort();
        paths
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}
