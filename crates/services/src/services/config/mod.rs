use std::path::PathBuf;

use thiserror::Error;

mod schema;

pub use schema::{Config, EmailConfig, GoogleOAuthConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Will always return config, falling back to defaults on missing/invalid
/// files. Secrets can be supplied via environment instead of the file.
pub async fn load_config_from_file(config_path: &PathBuf) -> Config {
    let config = match std::fs::read_to_string(config_path) {
        Ok(raw_config) => Config::from_raw(&raw_config),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                tracing::info!("No config file found, using defaults");
            } else {
                tracing::warn!("Failed to read config file: {}", err);
            }
            Config::default()
        }
    };
    config.with_env_overrides()
}

pub async fn save_config_to_file(config: &Config, config_path: &PathBuf) -> Result<(), ConfigError> {
    let raw_config = serde_json::to_string_pretty(&config.clone().normalized())?;
    std::fs::write(config_path, raw_config)?;
    Ok(())
}
