//! SSH tunnel configuration
//!
//! A server reachable only through an SSH host carries one of these. The
//! tunnel manager uses it to open a single forward shared by every database
//! session of that server, optionally hopping through a bastion first.

use crate::{OmniqlError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Authentication method for SSH connections
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SshAuthMethod {
    Password {
        password: String,
    },
    PrivateKey {
        path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
    /// Use the identities of the running SSH agent
    Agent,
}

impl std::fmt::Debug for SshAuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuthMethod::Password { .. } => f.write_str("Password"),
            SshAuthMethod::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("has_passphrase", &passphrase.is_some())
                .finish(),
            SshAuthMethod::Agent => f.write_str("Agent"),
        }
    }
}

impl SshAuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn private_key(path: impl Into<PathBuf>) -> Self {
        Self::PrivateKey {
            path: path.into(),
            passphrase: None,
        }
    }

    pub fn private_key_with_passphrase(
        path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self::PrivateKey {
            path: path.into(),
            passphrase: Some(passphrase.into()),
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if let SshAuthMethod::PrivateKey { path, .. } = self
            && path.as_os_str().is_empty()
        {
            return Err(OmniqlError::Configuration(format!(
                "{label} private key path cannot be empty"
            )));
        }
        Ok(())
    }
}

/// Jump host the SSH connection goes through before reaching `SshTunnelConfig::host`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshBastion {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub auth: SshAuthMethod,
}

impl SshBastion {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SshAuthMethod) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            auth,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_target("SSH bastion", &self.host, self.port, &self.username)?;
        self.auth.validate("SSH bastion")
    }
}

/// Configuration for establishing an SSH tunnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshTunnelConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub auth: SshAuthMethod,
    #[serde(default)]
    pub bastion: Option<SshBastion>,
    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Keep-alive interval in seconds, 0 disables keep-alives
    #[serde(default)]
    pub keepalive_seconds: u32,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_timeout() -> u32 {
    30
}

impl SshTunnelConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SshAuthMethod) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            auth,
            bastion: None,
            timeout_seconds: default_timeout(),
            keepalive_seconds: 0,
        }
    }

    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, username, SshAuthMethod::password(password))
    }

    pub fn with_private_key(
        host: impl Into<String>,
        username: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(host, username, SshAuthMethod::private_key(key_path))
    }

    pub fn with_agent(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(host, username, SshAuthMethod::Agent)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bastion(mut self, bastion: SshBastion) -> Self {
        self.bastion = Some(bastion);
        self
    }

    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn keepalive(mut self, seconds: u32) -> Self {
        self.keepalive_seconds = seconds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_target("SSH", &self.host, self.port, &self.username)?;
        self.auth.validate("SSH")?;

        if self.timeout_seconds == 0 {
            return Err(OmniqlError::Configuration(
                "SSH timeout must be at least 1 second".to_string(),
            ));
        }

        if let Some(bastion) = &self.bastion {
            bastion.validate()?;
        }

        Ok(())
    }
}

fn validate_target(label: &str, host: &str, port: u16, username: &str) -> Result<()> {
    if host.trim().is_empty() {
        return Err(OmniqlError::Configuration(format!(
            "{label} host cannot be empty"
        )));
    }

    if port == 0 {
        return Err(OmniqlError::Configuration(format!(
            "{label} port cannot be 0"
        )));
    }

    if username.trim().is_empty() {
        return Err(OmniqlError::Configuration(format!(
            "{label} username cannot be empty"
        )));
    }

    Ok(())
}
