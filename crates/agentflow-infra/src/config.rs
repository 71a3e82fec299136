//! Configuration loader for AgentFlow.
//!
//! Reads `config.toml` from the data directory (`~/.agentflow/` by default)
//! into [`AgentflowConfig`]. Falls back to defaults when the file is missing
//! or malformed.

use std::path::Path;

use agentflow_types::config::AgentflowConfig;

use crate::filesystem::config_path;

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults, logged at debug.
/// - Unreadable or unparsable file: defaults, logged as a warning.
pub async fn load_config(data_dir: &Path) -> AgentflowConfig {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return AgentflowConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return AgentflowConfig::default();
        }
    };

    match toml::from_str::<AgentflowConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            AgentflowConfig::default()
        }
    }
}
