//! Runtime configuration loader.

use crate::interfaces::RuntimeError;
use crate::prompt::DEFAULT_INSTRUCTIONS;
use medic_tools::execution_context::{MAX_ACTION_TIMEOUT_MS, OUTPUT_CAP_BYTES, QUERY_TIMEOUT_MS};
use medic_tools::{builtin_registry, DispatchLimits, Skill, SkillRegistry, SkillRegistryBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ENDPOINT_ENV: &str = "MEDIC_LLM_ENDPOINT";
pub const MODEL_ENV: &str = "MEDIC_LLM_MODEL";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            max_retries: 2,
        }
    }
}

impl BackendConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct MedicConfig {
    pub backend: BackendConfig,
    pub dispatch: DispatchLimits,
    /// Operating instructions, already read from disk.
    pub instructions: String,
    /// Replacement skill catalog. `None` means the built-in catalog.
    pub skills: Option<Vec<Skill>>,
    pub idle_timeout_secs: u64,
}

impl Default for MedicConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            dispatch: DispatchLimits::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            skills: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl MedicConfig {
    pub fn registry(&self) -> Result<SkillRegistry, RuntimeError> {
        let result = match &self.skills {
            Some(skills) => skills.iter().cloned().collect::<SkillRegistryBuilder>().build(),
            None => builtin_registry(),
        };
        result.map_err(|e| RuntimeError::ConfigError(format!("Invalid skill catalog: {}", e)))
    }

    /// Apply `MEDIC_LLM_ENDPOINT` and `MEDIC_LLM_MODEL` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend.endpoint = endpoint.trim().to_string();
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend.model = model.trim().to_string();
        }
    }
}

/// Raw config structure from YAML.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    backend: BackendConfig,
    #[serde(default)]
    dispatch: DispatchLimits,
    instructions: Option<String>,
    skills: Option<String>,
    idle_timeout_secs: Option<u64>,
}

/// Load configuration from a YAML file and apply environment overrides.
///
/// Relative `instructions` and `skills` paths resolve against the config
/// file's directory.
pub fn load_config(config_path: &str) -> Result<MedicConfig, RuntimeError> {
    let mut config = load_config_file(config_path)?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    Ok(config)
}

fn load_config_file(config_path: &str) -> Result<MedicConfig, RuntimeError> {
    let config_file = Path::new(config_path);

    if !config_file.exists() {
        return Err(RuntimeError::ConfigError(format!(
            "Config file not found: {}",
            config_path
        )));
    }

    let content = std::fs::read_to_string(config_file)?;

    if content.trim().is_empty() {
        return Err(RuntimeError::ConfigError("Config file is empty".to_string()));
    }

    let raw_config: RawConfig = serde_yaml::from_str(&content)
        .map_err(|e| RuntimeError::ConfigError(format!("Invalid YAML: {}", e)))?;

    if raw_config.backend.endpoint.trim().is_empty() {
        return Err(RuntimeError::ConfigError(
            "Config missing required field: backend.endpoint".to_string(),
        ));
    }

    let base = config_file.parent().unwrap_or_else(|| Path::new("."));

    let instructions = match &raw_config.instructions {
        Some(path) => {
            let path = resolve(base, path);
            if !path.exists() {
                return Err(RuntimeError::ConfigError(format!(
                    "Instructions file not found: {}",
                    path.display()
                )));
            }
            std::fs::read_to_string(&path)?
        }
        None => DEFAULT_INSTRUCTIONS.to_string(),
    };

    let skills = match &raw_config.skills {
        Some(path) => {
            let path = resolve(base, path);
            if !path.exists() {
                return Err(RuntimeError::ConfigError(format!(
                    "Skills file not found: {}",
                    path.display()
                )));
            }
            let content = std::fs::read_to_string(&path)?;
            let skills: Vec<Skill> = serde_yaml::from_str(&content).map_err(|e| {
                RuntimeError::ConfigError(format!("Invalid skills YAML: {}", e))
            })?;
            Some(skills)
        }
        None => None,
    };

    Ok(MedicConfig {
        backend: raw_config.backend,
        dispatch: clamp_limits(raw_config.dispatch),
        instructions,
        skills,
        idle_timeout_secs: raw_config
            .idle_timeout_secs
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
    })
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    if Path::new(path).is_absolute() {
        Path::new(path).to_path_buf()
    } else {
        base.join(path)
    }
}

fn clamp_limits(mut limits: DispatchLimits) -> DispatchLimits {
    if limits.action_timeout_ms > MAX_ACTION_TIMEOUT_MS {
        warn!(
            "action_timeout_ms {} exceeds {}, clamping",
            limits.action_timeout_ms, MAX_ACTION_TIMEOUT_MS
        );
        limits.action_timeout_ms = MAX_ACTION_TIMEOUT_MS;
    }
    if limits.query_timeout_ms > QUERY_TIMEOUT_MS {
        warn!(
            "query_timeout_ms {} exceeds {}, clamping",
            limits.query_timeout_ms, QUERY_TIMEOUT_MS
        );
        limits.query_timeout_ms = QUERY_TIMEOUT_MS;
    }
    if limits.output_cap_bytes > OUTPUT_CAP_BYTES {
        warn!(
            "output_cap_bytes {} exceeds {}, clamping",
            limits.output_cap_bytes, OUTPUT_CAP_BYTES
        );
        limits.output_cap_bytes = OUTPUT_CAP_BYTES;
    }
    limits
}
