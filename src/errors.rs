use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading from the execution or consensus layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Call reverted: {0}")]
    Revert(String),

    #[error("Unexpected on-chain data: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ChainError {
    /// Whether the failure should be retried on the next tick as-is.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout(_) | Self::NotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum StakeKeysError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module {module} resync timed out after {timeout:?}")]
    ResyncTimeout { module: String, timeout: Duration },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Error taxonomy used to decide how the worker reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, timeout or RPC failure. Retried on the next tick.
    TransientFetch,
    /// Unexpected on-chain shape. Fatal for the module's current tick.
    Decode,
    /// Transaction failure. Nothing was committed.
    Storage,
    /// Invalid configuration. Fatal at startup.
    Configuration,
    Other,
}

impl StakeKeysError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Chain(ChainError::Revert(_) | ChainError::Decode(_)) => ErrorKind::Decode,
            Self::Chain(_) | Self::Reqwest(_) | Self::ResyncTimeout { .. } => {
                ErrorKind::TransientFetch
            }
            Self::Database(_) | Self::Storage(_) => ErrorKind::Storage,
            Self::ConfigError(_) | Self::TomlParsing(_) => ErrorKind::Configuration,
            _ => ErrorKind::Other,
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Chain(ChainError::Decode(msg.into()))
    }
}

impl From<&str> for StakeKeysError {
    fn from(msg: &str) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl From<String> for StakeKeysError {
    fn from(msg: String) -> Self {
        Self::Custom(msg)
    }
}

pub type Result<T> = std::result::Result<T, StakeKeysError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let timeout = StakeKeysError::Chain(ChainError::Timeout(Duration::from_secs(5)));
        assert_eq!(timeout.kind(), ErrorKind::TransientFetch);

        let transport = StakeKeysError::Chain(ChainError::Transport {
            endpoint: "http://localhost:8545".to_string(),
            message: "connection refused".to_string(),
        });
        assert_eq!(transport.kind(), ErrorKind::TransientFetch);

        assert_eq!(StakeKeysError::decode("short blob").kind(), ErrorKind::Decode);
        assert_eq!(
            StakeKeysError::Chain(ChainError::Revert("execution reverted".into())).kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            StakeKeysError::Storage("serialization failure".into()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            StakeKeysError::ConfigError("chain_id must be set".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(StakeKeysError::from("boom").kind(), ErrorKind::Other);
    }

    #[test]
    fn test_chain_error_transience() {
        assert!(ChainError::Timeout(Duration::from_millis(10)).is_transient());
        assert!(!ChainError::Decode("bad".into()).is_transient());
        assert!(!ChainError::Revert("bad".into()).is_transient());
    }
}
