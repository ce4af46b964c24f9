//! Database driver trait definition

use crate::{DatabaseClient, Result, ServerConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Constructs clients for one engine
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Canonical engine identifier, e.g. "sqlite"
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Additional identifiers this driver answers to
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Opens a client for `database` on `server`, performing the handshake.
    ///
    /// `server` is the effective configuration: when a tunnel is active its
    /// host and port already point at the forwarded local endpoint.
    async fn connect(&self, server: &ServerConfig, database: &str)
    -> Result<Arc<dyn DatabaseClient>>;
}
