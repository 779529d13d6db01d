use anyhow::{Context, Result};
use medic_runtime::MedicConfig;
use std::path::Path;
use tracing::Level;

pub const LOG_ENV: &str = "MEDIC_LOG";
pub const DEFAULT_CONFIG_PATH: &str = "medic.yaml";

/// Load the configuration file at `path`, or `medic.yaml` in the working
/// directory when no path is given. A missing default file falls back to
/// built-in defaults; a missing explicit file is an error.
pub fn load(path: Option<&str>) -> Result<MedicConfig> {
    match path {
        Some(path) => medic_runtime::load_config(path)
            .with_context(|| format!("Failed to load config from {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            medic_runtime::load_config(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))
        }
        None => {
            let mut config = MedicConfig::default();
            config.apply_env_overrides(|name| std::env::var(name).ok());
            Ok(config)
        }
    }
}

/// Parse a `MEDIC_LOG` value. Unknown or empty values fall back to `info`.
pub fn log_level(value: Option<&str>) -> Level {
    value
        .and_then(|v| v.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}
