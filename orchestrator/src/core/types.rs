//! Project lifecycle vocabulary and the persisted project state record.
//!
//! These types define the contract between the orchestrator and the state file
//! on disk (`<project>/state/state.yaml`). Fields the orchestrator does not model
//! are kept in `extra` maps so a load/save cycle never drops them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle stage of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idea,
    Prp,
    Development,
    Test,
    HumanValidation,
    Release,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Idea,
        Phase::Prp,
        Phase::Development,
        Phase::Test,
        Phase::HumanValidation,
        Phase::Release,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idea => "idea",
            Phase::Prp => "prp",
            Phase::Development => "development",
            Phase::Test => "test",
            Phase::HumanValidation => "human_validation",
            Phase::Release => "release",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase name outside the six-value vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid phase '{value}' (valid: idea, prp, development, test, human_validation, release)"
)]
pub struct InvalidPhase {
    pub value: String,
}

impl FromStr for Phase {
    type Err = InvalidPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| InvalidPhase {
                value: s.to_string(),
            })
    }
}

/// The four automated pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Requirements,
    Developer,
    Tester,
    Documenter,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Requirements,
        AgentKind::Developer,
        AgentKind::Tester,
        AgentKind::Documenter,
    ];

    /// Short name used on the command line and in template file names.
    pub fn short_name(self) -> &'static str {
        match self {
            AgentKind::Requirements => "prp",
            AgentKind::Developer => "dev",
            AgentKind::Tester => "test",
            AgentKind::Documenter => "doc",
        }
    }

    /// Actor identifier stored in `actors.current` / `last_event.agent`.
    pub fn agent_id(self) -> &'static str {
        match self {
            AgentKind::Requirements => "prp_agent",
            AgentKind::Developer => "dev_agent",
            AgentKind::Tester => "test_agent",
            AgentKind::Documenter => "doc_agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_id())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.short_name() == s || kind.agent_id() == s)
            .ok_or_else(|| format!("unknown agent '{s}' (expected prp, dev, test or doc)"))
    }
}

pub const HUMAN: &str = "human";

/// Whoever is expected to act next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Agent(AgentKind),
    Human,
}

impl Actor {
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Agent(kind) => kind.agent_id(),
            Actor::Human => HUMAN,
        }
    }

    pub fn is_human(self) -> bool {
        self == Actor::Human
    }
}

/// Versioned artifacts tracked under `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Prp,
    Code,
    Docs,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Prp => "prp",
            ArtifactKind::Code => "code",
            ArtifactKind::Docs => "docs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventResult {
    Success,
    Failure,
}

/// Failure category recorded next to the coarse `blocking.reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// The prompt could not be assembled (an artifact was unreadable).
    PromptBuild,
    /// LLM call failed (budget, configuration, network, provider status, bad JSON).
    Transport,
    /// The agent could not turn the LLM output into effects.
    OutputProcessing,
    /// Effects were computed but writing project files failed.
    FileWrite,
}

impl BlockKind {
    /// Coarse reason kept for compatibility with existing state files.
    pub fn reason(self) -> &'static str {
        "agent_error"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Actors {
    pub current: String,
    pub awaiting_human: bool,
}

impl Default for Actors {
    fn default() -> Self {
        Self {
            current: AgentKind::Requirements.agent_id().to_string(),
            awaiting_human: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    pub agent: String,
    pub action: String,
    pub requires_human_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastEvent {
    pub agent: String,
    pub action: String,
    /// UTC, second precision (`2024-01-31T12:00:00Z`).
    pub timestamp: String,
    pub result: EventResult,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Blocking {
    pub is_blocked: bool,
    pub reason: Option<String>,
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_pass_rate: Option<f64>,
    #[serde(default)]
    pub revision_count: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Persisted lifecycle record for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub phase: Phase,
    #[serde(default)]
    pub actors: Actors,
    #[serde(default)]
    pub next_action: Option<NextAction>,
    #[serde(default)]
    pub last_event: Option<LastEvent>,
    #[serde(default)]
    pub blocking: Blocking,
    /// Artifact kind (`prp`, `code`, `docs`) to version string.
    #[serde(default, deserialize_with = "lenient_versions")]
    pub version: BTreeMap<String, String>,
    #[serde(default)]
    pub health: Health,
    #[serde(default)]
    pub meta: Meta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ProjectState {
    /// Fresh record in the `idea` phase, as project scaffolding creates it.
    pub fn new(project_id: &str) -> Self {
        Self {
            phase: Phase::Idea,
            actors: Actors::default(),
            next_action: None,
            last_event: None,
            blocking: Blocking::default(),
            version: BTreeMap::new(),
            health: Health::default(),
            meta: Meta {
                project_id: Some(project_id.to_string()),
                extra: BTreeMap::new(),
            },
            extra: BTreeMap::new(),
        }
    }

    pub fn version_of(&self, artifact: ArtifactKind) -> Option<&str> {
        self.version.get(artifact.as_str()).map(String::as_str)
    }
}

/// Accept hand-written versions such as `prp: 1.0` (a YAML float) as well as
/// quoted strings. Anything else becomes an empty string, which the version
/// bump treats as malformed.
///
/// An unquoted float keeps only its numeric value: `prp: 1.10` loads as
/// `"1.1"`. Versions written by `save` are strings, and the YAML emitter
/// quotes strings that would otherwise read as numbers, so they come back
/// unchanged.
fn lenient_versions<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(kind, value)| {
            let version = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                _ => String::new(),
            };
            (kind, version)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
    }

    #[test]
    fn phase_parse_rejects_unknown_and_case_variants() {
        for bad in ["", "Idea", "done", "human-validation", "release "] {
            let err = bad.parse::<Phase>().unwrap_err();
            assert_eq!(err.value, bad);
        }
    }

    #[test]
    fn agent_kind_accepts_short_and_actor_names() {
        assert_eq!("dev".parse::<AgentKind>(), Ok(AgentKind::Developer));
        assert_eq!("doc_agent".parse::<AgentKind>(), Ok(AgentKind::Documenter));
        assert!("deploy".parse::<AgentKind>().is_err());
    }

    #[test]
    fn state_yaml_keeps_unknown_fields() {
        let yaml = "\
phase: prp
actors:
  current: prp_agent
  awaiting_human: false
version:
  prp: 1.0
  code: '0.1.0'
meta:
  project_id: hello
  owner: ops
created_by: scaffold
";
        let state: ProjectState = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(state.phase, Phase::Prp);
        assert_eq!(state.version_of(ArtifactKind::Prp), Some("1.0"));
        assert_eq!(state.version_of(ArtifactKind::Code), Some("0.1.0"));
        assert_eq!(state.meta.project_id.as_deref(), Some("hello"));
        assert!(state.meta.extra.contains_key("owner"));
        assert!(state.extra.contains_key("created_by"));

        let written = serde_yaml::to_string(&state).expect("serialize");
        assert!(written.contains("created_by: scaffold"), "{written}");
        assert!(written.contains("owner: ops"), "{written}");
    }

    #[test]
    fn unquoted_float_version_loses_trailing_zero() {
        let yaml = "phase: prp\nversion:\n  prp: 1.10\n  docs: '1.10'\n  code: 2\n";
        let state: ProjectState = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(state.version_of(ArtifactKind::Prp), Some("1.1"));
        assert_eq!(state.version_of(ArtifactKind::Docs), Some("1.10"));
        assert_eq!(state.version_of(ArtifactKind::Code), Some("2"));
    }

    #[test]
    fn minimal_state_gets_structural_defaults() {
        let state: ProjectState = serde_yaml::from_str("phase: idea\n").expect("parse");
        assert!(!state.blocking.is_blocked);
        assert!(state.version.is_empty());
        assert_eq!(state.health.test_pass_rate, None);
        assert_eq!(state.last_event, None);
    }
}
