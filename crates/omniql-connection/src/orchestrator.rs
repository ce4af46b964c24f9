//! Connect/disconnect state machine for database sessions

use omniql_core::{DatabaseClient, OmniqlError, Result};
use omniql_drivers::DriverRegistry;
use std::sync::Arc;

use crate::server::Server;
use crate::session::DatabaseSession;
use crate::settings::{ConnectionSettings, TunnelShutdownPolicy};
use crate::ssh::SshTunnelConnector;
use crate::tunnel::TunnelConnector;

/// Clears the `connecting` flag of its attempt however the attempt ends,
/// including when the connect future is dropped.
struct ConnectingGuard {
    session: Arc<DatabaseSession>,
    epoch: u64,
}

impl Drop for ConnectingGuard {
    fn drop(&mut self) {
        self.session.finish_connect(self.epoch);
    }
}

/// Connects and disconnects the databases of [`Server`]s.
///
/// A failed connect always runs the full disconnect for its database, so the
/// session is left idle and retryable. Disconnect never fails.
pub struct ConnectionOrchestrator {
    drivers: Arc<DriverRegistry>,
    tunnels: Arc<dyn TunnelConnector>,
    settings: ConnectionSettings,
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("engines", &self.drivers.engines())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(DriverRegistry::with_defaults()))
    }
}

impl ConnectionOrchestrator {
    /// Orchestrator using SSH tunnels and default settings
    pub fn new(drivers: Arc<DriverRegistry>) -> Self {
        Self {
            drivers,
            tunnels: Arc::new(SshTunnelConnector::new()),
            settings: ConnectionSettings::default(),
        }
    }

    pub fn with_tunnels(mut self, tunnels: Arc<dyn TunnelConnector>) -> Self {
        self.tunnels = tunnels;
        self
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Connect `database` on `server` and return its session.
    ///
    /// Fails with `ConnectionInProgress`, without side effects, while another
    /// attempt for the same database is in flight.
    #[tracing::instrument(skip(self, server), fields(engine = %server.config().engine))]
    pub async fn connect(&self, server: &Server, database: &str) -> Result<Arc<DatabaseSession>> {
        let session = server.session_or_insert(database, self.settings.stream_chunk_size);
        let (epoch, stale) = session.begin_connect().inspect_err(|_| {
            tracing::warn!(database, "connection already in progress");
        })?;
        let _guard = ConnectingGuard {
            session: Arc::clone(&session),
            epoch,
        };

        match self.establish(server, &session, epoch, stale).await {
            Ok(()) => {
                tracing::info!(database, "database connected");
                Ok(session)
            }
            Err(err) => {
                // A superseded attempt was already torn down by the disconnect
                // that superseded it.
                if session.is_current(epoch) {
                    tracing::warn!(database, error = %err, "connect failed, cleaning up");
                    self.disconnect(server, database).await;
                }
                Err(err)
            }
        }
    }

    async fn establish(
        &self,
        server: &Server,
        session: &DatabaseSession,
        epoch: u64,
        stale: Option<Arc<dyn DatabaseClient>>,
    ) -> Result<()> {
        if let Some(stale) = stale {
            tracing::debug!(database = session.database(), "disconnecting stale client");
            disconnect_client(session.database(), stale).await;
        }

        if server.config().uses_ssh() {
            self.ensure_tunnel(server).await?;
            if !session.is_current(epoch) {
                self.shutdown_tunnel_if_idle(server).await;
                return Err(OmniqlError::Cancelled);
            }
        }

        let driver = self.drivers.resolve(&server.config().engine)?;
        let config = server.effective_config();
        tracing::debug!(
            database = session.database(),
            driver = driver.id(),
            host = ?config.host,
            port = ?config.port,
            "constructing client"
        );
        let client = driver.connect(&config, session.database()).await?;

        if !session.bind(epoch, Arc::clone(&client)) {
            tracing::warn!(
                database = session.database(),
                "connect superseded by a disconnect, discarding the new client"
            );
            disconnect_client(session.database(), client).await;
            self.shutdown_tunnel_if_idle(server).await;
            return Err(OmniqlError::Cancelled);
        }
        Ok(())
    }

    /// Creates the server's tunnel unless one is already up
    async fn ensure_tunnel(&self, server: &Server) -> Result<()> {
        let mut slot = server.tunnel_slot().lock().await;
        if slot.is_some() {
            tracing::debug!("reusing existing tunnel");
            return Ok(());
        }

        let tunnel = self.tunnels.connect_tunnel(server.config()).await?;
        let endpoint = tunnel.endpoint();
        tracing::info!(local = %endpoint, "tunnel established");
        server.set_endpoint(Some(endpoint));
        *slot = Some(tunnel);
        Ok(())
    }

    /// Disconnect `database`: drops its client, removes it from the server
    /// and shuts the tunnel down per [`TunnelShutdownPolicy`]. Errors are
    /// logged, never returned.
    #[tracing::instrument(skip(self, server), fields(engine = %server.config().engine))]
    pub async fn disconnect(&self, server: &Server, database: &str) {
        if let Some(session) = server.remove_session(database) {
            match session.release() {
                Some(client) => disconnect_client(database, client).await,
                None => tracing::debug!(database, "no client bound"),
            }
        }

        match self.settings.tunnel_shutdown {
            TunnelShutdownPolicy::OnAnyDisconnect => self.shutdown_tunnel(server).await,
            TunnelShutdownPolicy::WhenIdle => self.shutdown_tunnel_if_idle(server).await,
        }
        tracing::info!(database, "database disconnected");
    }

    /// Disconnect every database of `server` and close its tunnel
    pub async fn disconnect_all(&self, server: &Server) {
        for database in server.database_names() {
            self.disconnect(server, &database).await;
        }
        self.shutdown_tunnel(server).await;
    }

    async fn shutdown_tunnel_if_idle(&self, server: &Server) {
        if server.database_names().is_empty() {
            self.shutdown_tunnel(server).await;
        }
    }

    async fn shutdown_tunnel(&self, server: &Server) {
        let tunnel = server.tunnel_slot().lock().await.take();
        if let Some(tunnel) = tunnel {
            server.set_endpoint(None);
            if let Err(err) = tunnel.shutdown().await {
                tracing::warn!(error = %err, "tunnel shutdown failed");
            }
        }
    }
}

async fn disconnect_client(database: &str, client: Arc<dyn DatabaseClient>) {
    if let Err(err) = client.disconnect().await {
        tracing::warn!(database, error = %err, "client disconnect failed");
    }
}
