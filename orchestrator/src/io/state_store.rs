//! Durable storage for [`ProjectState`] (`<projects_dir>/<project>/state/state.yaml`).

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::core::types::{InvalidPhase, ProjectState};

const STATE_SCHEMA: &str = include_str!("../../schemas/project_state.schema.json");

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("invalid project id '{id}': {reason}")]
    InvalidProjectId { id: String, reason: String },
    #[error(transparent)]
    InvalidPhase(#[from] InvalidPhase),
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse state {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("state {} failed schema validation: {messages}", path.display())]
    Schema { path: PathBuf, messages: String },
    #[error("serialize state: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Validate that a project id is a single safe path component.
pub fn validate_project_id(id: &str) -> Result<(), StateError> {
    let invalid = |reason: &str| StateError::InvalidProjectId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if id == "." || id == ".." {
        return Err(invalid("must not be a relative path marker"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(invalid("must be [A-Za-z0-9._-] only"));
    }
    Ok(())
}

/// Loads and saves project state records under a projects directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    projects_dir: PathBuf,
}

impl StateStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn project_dir(&self, project_id: &str) -> Result<PathBuf, StateError> {
        validate_project_id(project_id)?;
        Ok(self.projects_dir.join(project_id))
    }

    pub fn state_path(&self, project_id: &str) -> Result<PathBuf, StateError> {
        Ok(self.project_dir(project_id)?.join("state").join("state.yaml"))
    }

    /// Load a project's state. Missing or empty records are `NotFound`.
    pub fn load(&self, project_id: &str) -> Result<ProjectState, StateError> {
        let path = self.state_path(project_id)?;
        debug!(path = %path.display(), "loading project state");
        if !path.exists() {
            return Err(StateError::NotFound { path });
        }
        let contents = fs::read_to_string(&path).map_err(|source| StateError::Io {
            action: "read state",
            path: path.clone(),
            source,
        })?;
        let value: Value = serde_yaml::from_str(&contents).map_err(|source| StateError::Parse {
            path: path.clone(),
            source,
        })?;
        if is_empty_record(&value) {
            return Err(StateError::NotFound { path });
        }
        validate_schema(&path, &value)?;
        let state: ProjectState =
            serde_yaml::from_str(&contents).map_err(|source| StateError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(phase = %state.phase, actor = %state.actors.current, blocked = state.blocking.is_blocked, "project state loaded");
        Ok(state)
    }

    /// Atomically replace a project's state (temp file + rename).
    pub fn save(&self, project_id: &str, state: &ProjectState) -> Result<(), StateError> {
        let path = self.state_path(project_id)?;
        debug!(path = %path.display(), phase = %state.phase, "writing project state");
        let buf = serde_yaml::to_string(state)?;
        write_atomic(&path, &buf)
    }

    pub fn exists(&self, project_id: &str) -> bool {
        self.state_path(project_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

fn is_empty_record(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn validate_schema(path: &Path, instance: &Value) -> Result<(), StateError> {
    let schema: Value = serde_json::from_str(STATE_SCHEMA).map_err(|err| StateError::Schema {
        path: path.to_path_buf(),
        messages: format!("embedded schema is invalid json: {err}"),
    })?;
    let compiled = jsonschema::validator_for(&schema).map_err(|err| StateError::Schema {
        path: path.to_path_buf(),
        messages: format!("embedded schema failed to compile: {err}"),
    })?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        return Ok(());
    }
    Err(StateError::Schema {
        path: path.to_path_buf(),
        messages: messages.join("; "),
    })
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), StateError> {
    let io_err = |action: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source| StateError::Io {
            action,
            path,
            source,
        }
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err("create directory", parent))?;
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, contents).map_err(io_err("write temp state", &tmp_path))?;
    fs::rename(&tmp_path, path).map_err(io_err("replace state", path))?;
    Ok(())
}
