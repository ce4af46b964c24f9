//! Server configuration: the settings of one physical target

use crate::security::{SshTunnelConfig, TlsConfig};
use crate::{OmniqlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A host/port pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration of one server, as consumed by drivers and the tunnel manager
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Engine identifier resolved through the driver registry
    pub engine: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Unix socket or named pipe path, used instead of host/port when set
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub default_database: Option<String>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub ssh: Option<SshTunnelConfig>,
    #[serde(default)]
    pub read_only: bool,
    /// Engine-specific settings, e.g. a warehouse name
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("socket_path", &self.socket_path)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("default_database", &self.default_database)
            .field("tls", &self.tls)
            .field("ssh", &self.ssh.as_ref().map(|s| &s.host))
            .field("read_only", &self.read_only)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServerConfig {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            host: None,
            port: None,
            socket_path: None,
            username: None,
            password: None,
            default_database: None,
            tls: None,
            ssh: None,
            read_only: false,
            options: HashMap::new(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn ssh(mut self, ssh: SshTunnelConfig) -> Self {
        self.ssh = Some(ssh);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn uses_ssh(&self) -> bool {
        self.ssh.is_some()
    }

    /// Database endpoint as seen from the SSH host. Requires an explicit port.
    pub fn remote_endpoint(&self) -> Result<Endpoint> {
        let port = self.port.ok_or_else(|| {
            OmniqlError::Configuration(format!(
                "a database port is required to tunnel to the {} server",
                self.engine
            ))
        })?;
        let host = self.host.clone().unwrap_or_else(|| "127.0.0.1".to_string());
        Ok(Endpoint::new(host, port))
    }

    /// Copy of this config pointing at `endpoint` instead of the configured host/port
    pub fn with_endpoint(&self, endpoint: &Endpoint) -> Self {
        let mut config = self.clone();
        config.host = Some(endpoint.host.clone());
        config.port = Some(endpoint.port);
        config.socket_path = None;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.trim().is_empty() {
            return Err(OmniqlError::Configuration(
                "engine cannot be empty".to_string(),
            ));
        }

        if self.port == Some(0) {
            return Err(OmniqlError::Configuration("port cannot be 0".to_string()));
        }

        if let Some(ssh) = &self.ssh {
            ssh.validate()?;
        }

        if let Some(tls) = &self.tls {
            tls.validate()?;
        }

        Ok(())
    }
}
