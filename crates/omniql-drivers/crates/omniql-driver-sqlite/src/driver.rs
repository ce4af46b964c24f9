//! SQLite driver implementation

use async_trait::async_trait;
use omniql_core::{DatabaseClient, DatabaseDriver, OmniqlError, Result, ServerConfig};
use std::sync::Arc;

use crate::SqliteClient;

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// The database file: the `path` option wins over the database name
fn database_path<'a>(server: &'a ServerConfig, database: &'a str) -> Result<&'a str> {
    server
        .option_str("path")
        .or(Some(database).filter(|d| !d.trim().is_empty()))
        .or(server.default_database.as_deref())
        .ok_or_else(|| {
            OmniqlError::Configuration(
                "SQLite requires a 'path' option or a database name, e.g. /path/to/database.db or :memory:"
                    .into(),
            )
        })
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn id(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["sqlite3"]
    }

    #[tracing::instrument(skip(self, server), fields(read_only = server.read_only))]
    async fn connect(
        &self,
        server: &ServerConfig,
        database: &str,
    ) -> Result<Arc<dyn DatabaseClient>> {
        let path = database_path(server, database)?;

        let client = SqliteClient::open(path, server.read_only).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(path = %path, "SQLite connection created");
        Ok(Arc::new(client))
    }
}
