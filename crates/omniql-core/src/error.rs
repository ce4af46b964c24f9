//! Error types for omniql

use thiserror::Error;

/// Core error type for omniql operations
#[derive(Error, Debug)]
pub enum OmniqlError {
    #[error("Connection already in progress for database '{0}'")]
    ConnectionInProgress(String),

    #[error("No connection available for database '{0}'")]
    NotConnected(String),

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Tunnel error: {0}")]
    Tunnel(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl OmniqlError {
    /// State errors are raised by connection guards before any I/O happens.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            OmniqlError::ConnectionInProgress(_) | OmniqlError::NotConnected(_)
        )
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, OmniqlError::NotSupported(_))
    }
}

impl From<toml::de::Error> for OmniqlError {
    fn from(err: toml::de::Error) -> Self {
        OmniqlError::Configuration(err.to_string())
    }
}

/// Result type alias for omniql operations
pub type Result<T> = std::result::Result<T, OmniqlError>;
