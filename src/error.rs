//! Error types for proofchain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("Chain is empty; genesis block was never created")]
    EmptyChain,
    #[error("Invalid block linkage at index {index}")]
    InvalidBlockLinkage { index: u64 },
    #[error("Invalid proof of work at index {index}")]
    InvalidProofOfWork { index: u64 },
    #[error("Proof search exhausted after {attempts} attempts")]
    ProofSearchExhausted { attempts: u64 },
    #[error("Mining cancelled")]
    MiningCancelled,
    #[error("Mining is already running")]
    MiningAlreadyRunning,
    #[error("Mining is not running")]
    MiningNotRunning,
    #[error("Background task failed: {0}")]
    TaskFailed(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid peer address: {0}")]
    InvalidPeer(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::NetworkError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
