//! Configuration types for D21

use crate::error::D21Error;
use crate::traits::D21Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Seven days, the default length of a voting window
pub const DEFAULT_VOTING_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Defaults for newly created elections
    #[serde(default)]
    pub election: ElectionConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Snapshot storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging level
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "d21-node".to_string(),
            data_dir: PathBuf::from("./data"),
            election: ElectionConfig::default(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from JSON
    pub fn from_json(json: &str) -> D21Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| D21Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no election can run with
    pub fn validate(&self) -> D21Result<()> {
        if self.election.voting_duration_secs == 0 {
            return Err(D21Error::ConfigError(
                "election.voting_duration_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Save to JSON
    pub fn to_json(&self) -> D21Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| D21Error::ConfigError(e.to_string()))
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> D21Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| D21Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Directory holding the snapshot database
    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("elections"))
    }
}

/// Election rules applied when an election is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Length of the voting window in seconds
    pub voting_duration_secs: u64,

    /// Reject subject registration once the voting window has closed
    pub close_subject_registration: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            voting_duration_secs: DEFAULT_VOTING_DURATION_SECS,
            close_subject_registration: true,
        }
    }
}

impl ElectionConfig {
    pub fn voting_duration(&self) -> Duration {
        Duration::from_secs(self.voting_duration_secs)
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.voting_duration_secs = secs;
        self
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    pub enabled: bool,

    /// API listen address
    pub listen_addr: String,

    /// Enable CORS
    pub enable_cors: bool,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:8021".to_string(),
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Snapshot storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist snapshots to disk instead of keeping them in memory
    pub persistent: bool,

    /// Database path, defaults to `<data_dir>/elections`
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_seven_days() {
        let config = ElectionConfig::default();
        assert_eq!(config.voting_duration(), Duration::from_secs(604_800));
        assert!(config.close_subject_registration);
    }

    #[test]
    fn test_node_config_json() {
        let mut config = NodeConfig::default();
        config.election.voting_duration_secs = 60;
        config.storage.persistent = true;

        let json = config.to_json().unwrap();
        let restored = NodeConfig::from_json(&json).unwrap();

        assert_eq!(restored.election.voting_duration_secs, 60);
        assert!(restored.storage.persistent);
        assert_eq!(restored.storage_path(), PathBuf::from("./data/elections"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"name":"n","data_dir":"/tmp/d21","log_level":"debug"}"#;
        let config = NodeConfig::from_json(json).unwrap();
        assert_eq!(config.election, ElectionConfig::default());
        assert_eq!(config.api.listen_addr, "127.0.0.1:8021");
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let err = NodeConfig::from_json("{").unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn test_zero_voting_window_rejected() {
        let mut config = NodeConfig::default();
        config.election.voting_duration_secs = 0;
        let json = config.to_json().unwrap();

        let err = NodeConfig::from_json(&json).unwrap_err();
        assert_eq!(err.code(), "config_error");

        let path = std::env::temp_dir().join(format!("d21-zero-window-{}.json", std::process::id()));
        std::fs::write(&path, &json).unwrap();
        assert!(NodeConfig::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
