//! Configuration management for proofchain

use crate::error::{ChainError, Result};
use crate::miner::Difficulty;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Budget for fetching one peer's chain during resolution.
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
    /// Resolve conflicts automatically every N seconds; 0 disables it.
    #[serde(default)]
    pub resolve_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            bootstrap_peers: Vec::new(),
            peer_timeout_ms: default_peer_timeout_ms(),
            resolve_interval_secs: 0,
        }
    }
}

impl NetworkConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub max_attempts: Option<u64>,
    /// Identity credited with mining rewards; random when unset.
    #[serde(default)]
    pub node_id: Option<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            threads: default_threads(),
            max_attempts: None,
            node_id: None,
        }
    }
}

impl MinerConfig {
    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty)
    }
}

impl Config {
    /// Check values that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.miner.difficulty == 0 || self.miner.difficulty > Difficulty::MAX {
            return Err(ChainError::Config(format!(
                "miner.difficulty must be between 1 and {}, got {}",
                Difficulty::MAX,
                self.miner.difficulty
            )));
        }
        if self.miner.threads == 0 {
            return Err(ChainError::Config(
                "miner.threads must be at least 1".to_string(),
            ));
        }
        if self.miner.max_attempts == Some(0) {
            return Err(ChainError::Config(
                "miner.max_attempts must be positive when set".to_string(),
            ));
        }
        if self.miner.node_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ChainError::Config(
                "miner.node_id must not be blank when set".to_string(),
            ));
        }
        if self.network.peer_timeout_ms == 0 {
            return Err(ChainError::Config(
                "network.peer_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate a TOML document.
pub fn parse_config(config_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(config_str)?;
    config.validate()?;
    Ok(config)
}

/// Load `path`, falling back to defaults when the file does not exist.
///
/// A `PORT` environment variable overrides `network.api_port`.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let mut config = match fs::read_to_string(path) {
        Ok(config_str) => parse_config(&config_str)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };

    if let Ok(port) = std::env::var("PORT") {
        config.network.api_port = port
            .parse()
            .map_err(|_| ChainError::Config(format!("PORT is not a valid port: {}", port)))?;
    }

    Ok(config)
}

pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

fn default_api_port() -> u16 {
    5000
}

fn default_peer_timeout_ms() -> u64 {
    3000
}

fn default_difficulty() -> u32 {
    Difficulty::DEFAULT.leading_zeros()
}

fn default_threads() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.api_port, 5000);
        assert_eq!(config.network.peer_timeout(), Duration::from_secs(3));
        assert_eq!(config.network.resolve_interval_secs, 0);
        assert_eq!(config.miner.difficulty().unwrap(), Difficulty::DEFAULT);
        assert_eq!(config.miner.threads, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_document() {
        let config = parse_config(
            r#"
            [network]
            api_port = 6001
            bootstrap_peers = ["127.0.0.1:6002"]

            [miner]
            difficulty = 3
            node_id = "node-a"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.api_port, 6001);
        assert_eq!(config.network.bootstrap_peers, vec!["127.0.0.1:6002"]);
        assert_eq!(config.network.peer_timeout_ms, 3000);
        assert_eq!(config.miner.difficulty, 3);
        assert_eq!(config.miner.threads, 1);
        assert_eq!(config.miner.node_id.as_deref(), Some("node-a"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            parse_config("[miner]\ndifficulty = 0"),
            Err(ChainError::Config(_))
        ));
        assert!(parse_config("[miner]\ndifficulty = 65").is_err());
        assert!(parse_config("[miner]\nthreads = 0").is_err());
        assert!(parse_config("[miner]\nmax_attempts = 0").is_err());
        assert!(parse_config("[miner]\nnode_id = \"  \"").is_err());
        assert!(parse_config("[network]\npeer_timeout_ms = 0").is_err());
        assert!(parse_config("[network]\napi_port = \"x\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[miner]\nthreads = 4").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.miner.threads, 4);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.miner.difficulty, 4);
    }
}
