//! Driver registry: maps engine identifiers to driver constructors

use async_trait::async_trait;
use omniql_core::{DatabaseClient, DatabaseDriver, OmniqlError, Result, ServerConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Registry of available database drivers.
///
/// Lookups are case-insensitive and honour each driver's aliases.
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn DatabaseDriver>>,
    aliases: HashMap<String, String>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: BTreeMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Create a registry with every compiled-in driver registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::sqlite::SqliteDriver::new()));

        registry
    }

    /// Register a driver under its id and aliases, replacing any previous owner
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let id = driver.id().to_lowercase();
        tracing::info!(driver = %id, aliases = ?driver.aliases(), "registering database driver");
        for alias in driver.aliases() {
            self.aliases.insert(alias.to_lowercase(), id.clone());
        }
        self.drivers.insert(id, driver);
    }

    fn canonical(&self, engine: &str) -> String {
        let key = engine.trim().to_lowercase();
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Get a driver by engine identifier or alias
    pub fn get(&self, engine: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(&self.canonical(engine)).cloned();
        if driver.is_none() {
            tracing::warn!(engine = %engine, "driver not found in registry");
        }
        driver
    }

    /// Like `get`, failing with `UnsupportedEngine` for unknown identifiers
    pub fn resolve(&self, engine: &str) -> Result<Arc<dyn DatabaseDriver>> {
        self.get(engine)
            .ok_or_else(|| OmniqlError::UnsupportedEngine(engine.to_string()))
    }

    pub fn has(&self, engine: &str) -> bool {
        self.drivers.contains_key(&self.canonical(engine))
    }

    /// Canonical ids of every registered driver, sorted
    pub fn engines(&self) -> Vec<&str> {
        self.drivers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Adapts a plain async constructor into a driver, for engines that need no
/// driver-level state.
pub struct FnDriver<F> {
    id: &'static str,
    display_name: &'static str,
    constructor: F,
}

impl<F> FnDriver<F> {
    pub fn new(id: &'static str, display_name: &'static str, constructor: F) -> Self {
        Self {
            id,
            display_name,
            constructor,
        }
    }
}

#[async_trait]
impl<F, Fut> DatabaseDriver for FnDriver<F>
where
    F: Fn(ServerConfig, String) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Arc<dyn DatabaseClient>>> + Send,
{
    fn id(&self) -> &'static str {
        self.id
    }

    fn display_name(&self) -> &'static str {
        self.display_name
    }

    async fn connect(
        &self,
        server: &ServerConfig,
        database: &str,
    ) -> Result<Arc<dyn DatabaseClient>> {
        (self.constructor)(server.clone(), database.to_string()).await
    }
}
