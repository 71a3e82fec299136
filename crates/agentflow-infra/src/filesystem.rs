//! Data directory layout.

use std::path::{Path, PathBuf};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `AGENTFLOW_DATA_DIR` environment variable
/// 2. `~/.agentflow`
/// 3. `./.agentflow`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AGENTFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".agentflow");
    }

    PathBuf::from(".agentflow")
}

/// `{data_dir}/agentflow.db`
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("agentflow.db")
}

/// `{data_dir}/config.toml`
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Create the data directory if it does not exist.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_data_dir() {
        let dir = Path::new("/tmp/af");
        assert_eq!(database_path(dir), PathBuf::from("/tmp/af/agentflow.db"));
        assert_eq!(config_path(dir), PathBuf::from("/tmp/af/config.toml"));
    }

    #[test]
    fn test_resolve_data_dir_is_not_empty() {
        assert!(!resolve_data_dir().as_os_str().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_data_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_data_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        // Idempotent.
        ensure_data_dir(&nested).await.unwrap();
    }
}
