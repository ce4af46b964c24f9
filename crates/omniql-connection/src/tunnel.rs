//! Tunnel abstraction shared by every database of a server

use async_trait::async_trait;
use omniql_core::{Endpoint, Result, ServerConfig};

/// Transport behind a [`Tunnel`]
#[async_trait]
pub trait TunnelHandle: Send + Sync {
    /// Stop forwarding and release the transport. Called once.
    async fn shutdown(&self) -> Result<()>;
}

/// An established port forward exposing a local endpoint
pub struct Tunnel {
    local_host: String,
    local_port: u16,
    handle: Box<dyn TunnelHandle>,
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("local_host", &self.local_host)
            .field("local_port", &self.local_port)
            .finish_non_exhaustive()
    }
}

impl Tunnel {
    pub fn new(
        local_host: impl Into<String>,
        local_port: u16,
        handle: Box<dyn TunnelHandle>,
    ) -> Self {
        Self {
            local_host: local_host.into(),
            local_port,
            handle,
        }
    }

    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.local_host.clone(), self.local_port)
    }

    pub async fn shutdown(self) -> Result<()> {
        tracing::info!(local = %self.endpoint(), "shutting down tunnel");
        self.handle.shutdown().await
    }
}

/// Creates tunnels for servers with an SSH block
#[async_trait]
pub trait TunnelConnector: Send + Sync {
    async fn connect_tunnel(&self, server: &ServerConfig) -> Result<Tunnel>;
}
