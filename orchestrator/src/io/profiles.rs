//! LLM profile registry (`llm.profiles.yaml`) and per-project profile resolution.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_PROFILE_NAME: &str = "gemma-free";

/// Configuration problems surfaced before any state change or network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
    #[error("Default profile not found: {0}")]
    MissingDefaultProfile(String),
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One named provider/model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProfile {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Environment variable holding the API key; `None` for keyless providers.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Provider-specific fields carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> usize {
    2048
}

fn default_max_context_tokens() -> usize {
    8192
}

/// Endpoint and auth convention of a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub auth_header: Option<String>,
    pub auth_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRegistry {
    pub default_profile: String,
    pub profiles: BTreeMap<String, LlmProfile>,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self {
            default_profile: DEFAULT_PROFILE_NAME.to_string(),
            profiles: BTreeMap::new(),
            providers: BTreeMap::new(),
        }
    }
}

/// Shape of a project's `config/llm.yaml`: a reference or a full profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProjectLlmConfig {
    Full(LlmProfile),
    Reference { profile: String },
}

/// Fully resolved settings for one run, API key included.
#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    /// Profile name, or `None` when the project carries a full inline config.
    pub profile_name: Option<String>,
    pub profile: LlmProfile,
    pub provider_config: ProviderConfig,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("profile_name", &self.profile_name)
            .field("profile", &self.profile)
            .field("provider_config", &self.provider_config)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Load the registry; a missing file is an empty registry.
pub fn load_registry(path: &Path) -> Result<ProfileRegistry, ConfigError> {
    match read_optional_yaml(path)? {
        Some(registry) => Ok(registry),
        None => Ok(ProfileRegistry::default()),
    }
}

impl ProfileRegistry {
    /// Resolve the profile for a project.
    ///
    /// Order: explicit override, project `config/llm.yaml` with a full config,
    /// project `config/llm.yaml` naming a profile, then the registry default.
    pub fn resolve(
        &self,
        project_llm_path: &Path,
        profile_override: Option<&str>,
    ) -> Result<(Option<String>, LlmProfile), ConfigError> {
        if let Some(name) = profile_override {
            debug!(profile = name, "using profile override");
            return self.named(name).map(|p| (Some(name.to_string()), p));
        }

        match read_optional_yaml::<ProjectLlmConfig>(project_llm_path)? {
            Some(ProjectLlmConfig::Full(profile)) => {
                debug!(path = %project_llm_path.display(), "using project llm config");
                Ok((None, profile))
            }
            Some(ProjectLlmConfig::Reference { profile }) => {
                debug!(profile = %profile, "using project profile reference");
                self.named(&profile).map(|p| (Some(profile), p))
            }
            None => {
                let name = &self.default_profile;
                let profile = self
                    .profiles
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingDefaultProfile(name.clone()))?;
                debug!(profile = %name, "using default profile");
                Ok((Some(name.clone()), profile))
            }
        }
    }

    fn named(&self, name: &str) -> Result<LlmProfile, ConfigError> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// Provider settings for `provider`; unknown providers get an empty config
    /// (the gateway then fails fast on the missing base URL).
    pub fn provider_config(&self, provider: &str) -> ProviderConfig {
        self.providers.get(provider).cloned().unwrap_or_default()
    }
}

/// Read the API key named by the profile through `lookup`.
pub fn resolve_api_key<F>(profile: &LlmProfile, lookup: F) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(var) = profile.api_key_env.as_deref() else {
        return Ok(None);
    };
    match lookup(var) {
        Some(key) if !key.trim().is_empty() => Ok(Some(key)),
        _ => Err(ConfigError::MissingApiKey(var.to_string())),
    }
}

/// Resolve profile, provider and API key for one run.
pub fn resolve_llm_settings<F>(
    registry: &ProfileRegistry,
    project_llm_path: &Path,
    profile_override: Option<&str>,
    lookup: F,
) -> Result<LlmSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (profile_name, profile) = registry.resolve(project_llm_path, profile_override)?;
    let provider_config = registry.provider_config(&profile.provider);
    let api_key = resolve_api_key(&profile, lookup)?;
    Ok(LlmSettings {
        profile_name,
        profile,
        provider_config,
        api_key,
    })
}

/// Missing or empty files read as `None`.
fn read_optional_yaml<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
