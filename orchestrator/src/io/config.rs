//! Orchestrator configuration stored in `factory.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "factory.toml";

/// Process-wide configuration, built once at startup and passed to the state
/// store, the LLM gateway and the agents.
///
/// Relative paths are resolved against the directory containing the config
/// file (see [`FactoryConfig::resolve_paths`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FactoryConfig {
    /// Directory holding one sub-directory per project.
    pub projects_dir: PathBuf,

    /// LLM profile registry (YAML).
    pub profiles_path: PathBuf,

    /// Global agent system prompts (`<kind>_agent.md`).
    pub templates_dir: PathBuf,

    /// Timeout for a single LLM request.
    pub llm_timeout_secs: u64,

    pub syntax_check: SyntaxCheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyntaxCheckConfig {
    /// Checker command; the file path is appended as the last argument.
    pub command: Vec<String>,

    /// Extension (without dot) of files that get checked.
    pub extension: String,

    /// Per-file timeout.
    pub timeout_secs: u64,

    /// Truncate captured checker output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for SyntaxCheckConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "py_compile".to_string(),
            ],
            extension: "py".to_string(),
            timeout_secs: 30,
            output_limit_bytes: 64 * 1024,
        }
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            projects_dir: PathBuf::from("projects"),
            profiles_path: PathBuf::from("config/llm.profiles.yaml"),
            templates_dir: PathBuf::from("agents/templates"),
            llm_timeout_secs: 120,
            syntax_check: SyntaxCheckConfig::default(),
        }
    }
}

impl FactoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm_timeout_secs == 0 {
            return Err(anyhow!("llm_timeout_secs must be > 0"));
        }
        if self.syntax_check.timeout_secs == 0 {
            return Err(anyhow!("syntax_check.timeout_secs must be > 0"));
        }
        if self.syntax_check.output_limit_bytes == 0 {
            return Err(anyhow!("syntax_check.output_limit_bytes must be > 0"));
        }
        if self.syntax_check.command.is_empty() || self.syntax_check.command[0].trim().is_empty()
        {
            return Err(anyhow!("syntax_check.command must be a non-empty array"));
        }
        if self.syntax_check.extension.trim().is_empty()
            || self.syntax_check.extension.starts_with('.')
        {
            return Err(anyhow!(
                "syntax_check.extension must be a bare extension such as \"py\""
            ));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Anchor relative paths at `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        for path in [
            &mut self.projects_dir,
            &mut self.profiles_path,
            &mut self.templates_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FactoryConfig::default()`. Relative paths
/// are anchored at the config file's directory either way.
pub fn load_config(path: &Path) -> Result<FactoryConfig> {
    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !path.exists() {
        let cfg = FactoryConfig::default();
        cfg.validate()?;
        return Ok(cfg.resolve_paths(base));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FactoryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg.resolve_paths(base))
}
