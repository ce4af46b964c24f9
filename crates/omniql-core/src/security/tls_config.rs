//! TLS settings handed to drivers that speak encrypted protocols

use crate::{OmniqlError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TLS mode, following the PostgreSQL `sslmode` names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl TlsMode {
    pub fn requires_encryption(&self) -> bool {
        matches!(
            self,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull
        )
    }

    pub fn requires_ca_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub mode: TlsMode,
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Accept server certificates that fail verification
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TlsConfig {
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    pub fn client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode.requires_ca_verification() && self.ca_cert.is_none() {
            return Err(OmniqlError::Configuration(
                "TLS mode requires a CA certificate but none was provided".to_string(),
            ));
        }

        if self.mode.requires_ca_verification() && self.accept_invalid_certs {
            return Err(OmniqlError::Configuration(
                "TLS mode verifies certificates; accept_invalid_certs contradicts it".to_string(),
            ));
        }

        for (label, path) in [
            ("CA certificate", &self.ca_cert),
            ("client certificate", &self.client_cert),
            ("client key", &self.client_key),
        ] {
            if let Some(path) = path
                && path.as_os_str().is_empty()
            {
                return Err(OmniqlError::Configuration(format!(
                    "{label} path cannot be empty"
                )));
            }
        }

        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => Err(OmniqlError::Configuration(
                "client certificate provided but client key is missing".to_string(),
            )),
            (None, Some(_)) => Err(OmniqlError::Configuration(
                "client key provided but client certificate is missing".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
