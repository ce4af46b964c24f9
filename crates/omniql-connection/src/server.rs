//! Runtime state of one configured server

use omniql_core::{Endpoint, ServerConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::session::DatabaseSession;
use crate::tunnel::Tunnel;

/// A configured server: its tunnel, forwarded endpoint and database sessions.
///
/// Only [`crate::ConnectionOrchestrator`] mutates this state.
pub struct Server {
    config: ServerConfig,
    tunnel: tokio::sync::Mutex<Option<Tunnel>>,
    endpoint: RwLock<Option<Endpoint>>,
    databases: RwLock<HashMap<String, Arc<DatabaseSession>>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("engine", &self.config.engine)
            .field("endpoint", &*self.endpoint.read())
            .field("databases", &self.database_names())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            tunnel: tokio::sync::Mutex::new(None),
            endpoint: RwLock::new(None),
            databases: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session(&self, database: &str) -> Option<Arc<DatabaseSession>> {
        self.databases.read().get(database).cloned()
    }

    /// Registered databases, sorted
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_tunnel(&self) -> bool {
        self.endpoint.read().is_some()
    }

    /// Forwarded endpoint of the active tunnel
    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.endpoint.read().clone()
    }

    /// The configuration drivers connect with: host and port point at the
    /// tunnel while one is active.
    pub fn effective_config(&self) -> ServerConfig {
        match &*self.endpoint.read() {
            Some(endpoint) => self.config.with_endpoint(endpoint),
            None => self.config.clone(),
        }
    }

    pub(crate) fn session_or_insert(
        &self,
        database: &str,
        default_chunk_size: usize,
    ) -> Arc<DatabaseSession> {
        self.databases
            .write()
            .entry(database.to_string())
            .or_insert_with(|| {
                Arc::new(DatabaseSession::new(
                    database,
                    self.config.engine.clone(),
                    default_chunk_size,
                ))
            })
            .clone()
    }

    pub(crate) fn remove_session(&self, database: &str) -> Option<Arc<DatabaseSession>> {
        self.databases.write().remove(database)
    }

    pub(crate) fn tunnel_slot(&self) -> &tokio::sync::Mutex<Option<Tunnel>> {
        &self.tunnel
    }

    pub(crate) fn set_endpoint(&self, endpoint: Option<Endpoint>) {
        *self.endpoint.write() = endpoint;
    }
}
