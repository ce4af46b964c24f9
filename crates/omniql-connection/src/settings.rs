//! Orchestrator settings

use omniql_core::{OmniqlError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When a server's shared tunnel is shut down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelShutdownPolicy {
    /// Once the last database session of the server disconnects
    #[default]
    WhenIdle,
    /// On every database disconnect, even with other sessions still riding it
    OnAnyDisconnect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub tunnel_shutdown: TunnelShutdownPolicy,
    /// Rows per chunk when a streaming call does not pick its own size
    pub stream_chunk_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            tunnel_shutdown: TunnelShutdownPolicy::default(),
            stream_chunk_size: 500,
        }
    }
}

impl ConnectionSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading connection settings");
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream_chunk_size == 0 {
            return Err(OmniqlError::Configuration(
                "stream_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tunnel_shutdown(mut self, policy: TunnelShutdownPolicy) -> Self {
        self.tunnel_shutdown = policy;
        self
    }

    pub fn stream_chunk_size(mut self, rows: usize) -> Self {
        self.stream_chunk_size = rows;
        self
    }
}
