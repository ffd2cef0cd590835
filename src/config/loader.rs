//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Environment variable holding the upstream credential.
pub const ENV_API_KEY: &str = "RELAY_UPSTREAM_API_KEY";
/// Older deployments exported the credential under this name.
pub const ENV_API_KEY_LEGACY: &str = "POE_TOKEN";
pub const ENV_BIND_ADDRESS: &str = "RELAY_BIND_ADDRESS";
pub const ENV_DEFAULT_MODEL: &str = "RELAY_DEFAULT_MODEL";

/// Load and validate configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: RelayConfig = toml::from_str(&content)?;
    finish(config)
}

/// Build configuration from defaults plus environment overrides.
pub fn load_from_env() -> Result<RelayConfig, ConfigError> {
    finish(RelayConfig::default())
}

fn finish(mut config: RelayConfig) -> Result<RelayConfig, ConfigError> {
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply overrides looked up through `lookup`. Blank values are ignored.
pub fn apply_overrides<F>(config: &mut RelayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = get(ENV_API_KEY).or_else(|| get(ENV_API_KEY_LEGACY)) {
        config.upstream.api_key = Some(key);
    }
    if let Some(addr) = get(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
    if let Some(model) = get(ENV_DEFAULT_MODEL) {
        config.upstream.default_model = model;
    }
}
