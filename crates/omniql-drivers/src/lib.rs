//! omniql drivers - engine driver implementations and the registry that
//! resolves engine identifiers to them.

#[cfg(feature = "sqlite")]
pub use omniql_driver_sqlite as sqlite;

mod registry;

pub use registry::{DriverRegistry, FnDriver};

pub use omniql_core::{DatabaseClient, DatabaseDriver, OmniqlError, Result, ServerConfig};

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_registry_connects_sqlite() {
        let registry = DriverRegistry::with_defaults();
        let driver = registry.resolve("sqlite3").expect("sqlite is compiled in");

        let client = driver
            .connect(&ServerConfig::new("sqlite"), ":memory:")
            .await
            .expect("in-memory database opens");

        client
            .execute_query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .await
            .expect("create table");

        let tables = client.list_tables(":memory:", None).await.expect("list tables");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "users");

        client.disconnect().await.expect("disconnect");
    }
}
