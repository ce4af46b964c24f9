#![cfg(feature = "sqlite")]

/// Integration tests for the SQLite driver
use omniql_core::{
    AlterTableSpec, ColumnDefinition, DatabaseClient, DatabaseDriver, FilterCondition, FilterOp,
    ForeignKeyAction, KeyValue, OmniqlError, SelectFilter, SelectTopRequest, ServerConfig,
    TableChanges, TriggerEvent, TriggerTiming, Value,
};
use omniql_drivers::DriverRegistry;
use omniql_drivers::sqlite::SqliteDriver;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT,
    balance REAL DEFAULT 0.0
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 1,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
CREATE INDEX idx_users_email ON users(email DESC);
CREATE VIEW active_users AS SELECT id, username FROM users WHERE balance > 0;
CREATE TRIGGER audit_order AFTER INSERT ON orders BEGIN SELECT 1; END;
INSERT INTO users (username, email, balance) VALUES
    ('ada', 'ada@example.com', 10.5),
    ('grace', 'grace@example.com', 0),
    ('linus', NULL, 3);
INSERT INTO orders (user_id, quantity) VALUES (1, 2), (3, 1);
"#;

/// Opens a file-backed database with sample data
async fn setup() -> (TempDir, Arc<dyn DatabaseClient>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let client = SqliteDriver::new()
        .connect(&ServerConfig::new("sqlite"), path.to_str().unwrap())
        .await
        .expect("failed to open test database");
    client.execute_query(SCHEMA).await.expect("failed to seed schema");
    (dir, client)
}

#[tokio::test]
async fn test_registry_resolves_sqlite_alias() {
    let registry = DriverRegistry::with_defaults();
    let driver = registry.resolve("SQLite3").unwrap();
    assert_eq!(driver.id(), "sqlite");

    let client = driver
        .connect(&ServerConfig::new("sqlite"), ":memory:")
        .await
        .unwrap();
    assert_eq!(client.engine(), "sqlite");
    assert!(client.version_string().await.unwrap().starts_with("SQLite 3."));
}

#[tokio::test]
async fn test_execute_query_reports_each_statement() {
    let (_dir, client) = setup().await;

    let results = client
        .execute_query("UPDATE users SET balance = balance + 1; SELECT username FROM users ORDER BY id")
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].affected_rows, 3);
    assert_eq!(results[0].command.as_deref(), Some("UPDATE"));
    assert_eq!(results[1].row_count(), 3);
    assert_eq!(results[1].rows[0].get_by_name("username"), Some(&Value::from("ada")));
}

#[tokio::test]
async fn test_schema_listing() {
    let (_dir, client) = setup().await;

    let tables = client.list_tables("main", None).await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);
    assert_eq!(tables[0].schema.as_deref(), Some("main"));

    let views = client.list_views(None).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "active_users");

    assert!(client.list_routines(None).await.unwrap().is_empty());
    assert_eq!(client.list_databases(None).await.unwrap()[0], "main");
    assert!(client.list_schemas("main", None).await.unwrap().contains(&"main".to_string()));
}

#[tokio::test]
async fn test_columns_and_keys() {
    let (_dir, client) = setup().await;

    let columns = client.list_table_columns("users", None).await.unwrap();
    assert_eq!(columns.len(), 4);
    assert_eq!(columns[1].column_name, "username");
    assert_eq!(columns[1].data_type, "TEXT");
    assert!(!columns[1].nullable);
    assert!(columns[2].nullable);
    assert_eq!(columns[3].default_value.as_deref(), Some("0.0"));

    assert_eq!(
        client.get_primary_key("users", None).await.unwrap().as_deref(),
        Some("id")
    );
    let keys = client.get_primary_keys("users", Some("main")).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].position, 1);

    let err = client.list_table_columns("missing", None).await.unwrap_err();
    assert!(matches!(err, OmniqlError::NotFound(_)));
}

#[tokio::test]
async fn test_relations_indexes_and_triggers() {
    let (_dir, client) = setup().await;

    let keys = client.get_table_keys("orders", None).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].from_column, "user_id");
    assert_eq!(keys[0].to_table, "users");
    assert_eq!(keys[0].to_column, "id");
    assert_eq!(keys[0].on_delete, ForeignKeyAction::Cascade);

    let references = client.get_table_references("users", None).await.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].from_table, "orders");

    let indexes = client.list_table_indexes("users", None).await.unwrap();
    let email = indexes
        .iter()
        .find(|i| i.name == "idx_users_email")
        .expect("email index");
    assert!(!email.unique);
    assert_eq!(email.columns[0].name, "email");
    assert_eq!(email.columns[0].order, omniql_core::SortOrder::Desc);
    assert!(indexes.iter().any(|i| i.unique && !i.primary));

    let triggers = client.list_table_triggers("orders", None).await.unwrap();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].name, "audit_order");
    assert_eq!(triggers[0].timing, Some(TriggerTiming::After));
    assert_eq!(triggers[0].events, vec![TriggerEvent::Insert]);

    let properties = client.get_table_properties("users", None).await.unwrap();
    assert_eq!(properties.row_count, Some(3));
    assert!(properties.partitions.is_empty());
}

#[tokio::test]
async fn test_create_scripts() {
    let (_dir, client) = setup().await;

    let table = client.get_table_create_script("users", None).await.unwrap();
    assert!(table.starts_with("CREATE TABLE users"));
    assert!(table.ends_with(';'));

    let view = client.get_view_create_script("active_users", None).await.unwrap();
    assert!(view.starts_with("CREATE VIEW active_users"));

    let err = client.get_table_create_script("nope", None).await.unwrap_err();
    assert!(matches!(err, OmniqlError::NotFound(_)));

    let err = client
        .get_materialized_view_create_script("anything", None)
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_select_top_with_filter_and_paging() {
    let (_dir, client) = setup().await;

    let request = SelectTopRequest::new("users", 1)
        .order_by("id", true)
        .offset(1)
        .filter(SelectFilter::Conditions(vec![FilterCondition {
            field: "balance".into(),
            op: FilterOp::Gt,
            value: Value::Int(1),
        }]));
    let result = client.select_top(&request).await.unwrap();

    assert_eq!(result.row_count(), 1);
    assert_eq!(result.rows[0].get_by_name("username"), Some(&Value::from("ada")));
}

#[tokio::test]
async fn test_query_stream_yields_chunks() {
    let (_dir, client) = setup().await;
    client
        .execute_query("INSERT INTO users (username) VALUES ('u4'), ('u5')")
        .await
        .unwrap();

    let mut stream = client
        .query_stream("main", "SELECT id FROM users ORDER BY id", 2)
        .await
        .unwrap();
    assert_eq!(stream.columns[0].name, "id");
    assert!(stream.is_cancelable());

    let mut sizes = Vec::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        sizes.push(chunk.len());
    }
    assert_eq!(sizes, vec![2, 2, 1]);

    let request = SelectTopRequest::new("users", 10);
    let rows = client
        .select_top_stream("main", &request, 3)
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_query_stream_reports_prepare_errors() {
    let (_dir, client) = setup().await;
    let err = client
        .query_stream("main", "SELECT * FROM missing", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, OmniqlError::Query(_)));
}

#[tokio::test]
async fn test_open_stream_does_not_block_client() {
    let (_dir, client) = setup().await;
    client
        .execute_query(
            "CREATE TABLE t (id INTEGER PRIMARY KEY); \
             WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 100) \
             INSERT INTO t (id) SELECT x FROM n",
        )
        .await
        .unwrap();

    let mut stream = client
        .query_stream("main", "SELECT id FROM t ORDER BY id", 10)
        .await
        .unwrap();
    let first = stream.next_chunk().await.unwrap().unwrap();
    assert_eq!(first.len(), 10);

    // The stream is only partly read; the client stays usable
    let version = tokio::time::timeout(Duration::from_secs(3), client.version_string())
        .await
        .expect("version_string blocked while a stream was open")
        .unwrap();
    assert!(version.starts_with("SQLite"));

    let columns = tokio::time::timeout(
        Duration::from_secs(3),
        client.list_table_columns("t", None),
    )
    .await
    .expect("list_table_columns blocked while a stream was open")
    .unwrap();
    assert_eq!(columns.len(), 1);

    tokio::time::timeout(
        Duration::from_secs(3),
        client.execute_query("INSERT INTO t (id) VALUES (101)"),
    )
    .await
    .expect("write blocked while a stream was open")
    .unwrap();

    let rest = stream.collect_rows().await.unwrap();
    assert_eq!(first.len() + rest.len(), 100);
}

#[tokio::test]
async fn test_in_memory_stream_releases_connection() {
    let client = SqliteDriver::new()
        .connect(&ServerConfig::new("sqlite"), ":memory:")
        .await
        .unwrap();
    client
        .execute_query("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2), (3)")
        .await
        .unwrap();

    let mut stream = client
        .query_stream("main", "SELECT id FROM t ORDER BY id", 2)
        .await
        .unwrap();
    assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 2);

    let version = tokio::time::timeout(Duration::from_secs(3), client.version_string())
        .await
        .expect("version_string blocked while a stream was open")
        .unwrap();
    assert!(version.starts_with("SQLite"));
    assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 1);
    assert!(stream.next_chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn test_apply_changes_is_atomic() {
    let (_dir, client) = setup().await;

    let changes = TableChanges::new()
        .insert(
            "users",
            vec![
                ("username".to_string(), Value::from("margaret")),
                ("balance".to_string(), Value::Float(1.0)),
            ],
        )
        .update("users", vec![KeyValue::new("id", 2)], "email", Value::Null)
        .delete("orders", vec![KeyValue::new("id", 2)]);
    let results = client.apply_changes(&changes).await.unwrap();
    assert_eq!(
        results.iter().map(|r| r.affected_rows).collect::<Vec<_>>(),
        vec![1, 1, 1]
    );

    // the duplicate username fails the batch, rolling back the first insert
    let failing = TableChanges::new()
        .insert("users", vec![("username".to_string(), Value::from("new_user"))])
        .insert("users", vec![("username".to_string(), Value::from("ada"))]);
    assert!(client.apply_changes(&failing).await.is_err());

    let count = client
        .execute_query("SELECT COUNT(*) FROM users")
        .await
        .unwrap();
    assert_eq!(count[0].rows[0].get(0), Some(&Value::Int(4)));
}

#[tokio::test]
async fn test_alter_and_duplicate_table() {
    let (_dir, client) = setup().await;

    let spec = AlterTableSpec::new("users").add(ColumnDefinition::new("nickname", "TEXT"));
    client.alter_table(&spec).await.unwrap();
    let columns = client.list_table_columns("users", None).await.unwrap();
    assert_eq!(columns.last().unwrap().column_name, "nickname");

    client.duplicate_table("users", None, "users_copy").await.unwrap();
    let copy = client
        .execute_query("SELECT COUNT(*) FROM users_copy")
        .await
        .unwrap();
    assert_eq!(copy[0].rows[0].get(0), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_truncate_all_tables_ignores_foreign_keys() {
    let (_dir, client) = setup().await;

    client.truncate_all_tables("main", None).await.unwrap();

    for table in ["users", "orders"] {
        let rows = client
            .execute_query(&format!("SELECT COUNT(*) FROM {table}"))
            .await
            .unwrap();
        assert_eq!(rows[0].rows[0].get(0), Some(&Value::Int(0)));
    }

    let fk = client.execute_query("PRAGMA foreign_keys").await.unwrap();
    assert_eq!(fk[0].rows[0].get(0), Some(&Value::Int(1)));
}

#[tokio::test]
async fn test_drop_element() {
    let (_dir, client) = setup().await;

    client
        .drop_element("active_users", omniql_core::DatabaseElement::View, None)
        .await
        .unwrap();
    assert!(client.list_views(None).await.unwrap().is_empty());

    client
        .truncate_element("orders", omniql_core::DatabaseElement::Table, None)
        .await
        .unwrap();
    let rows = client.execute_query("SELECT * FROM orders").await.unwrap();
    assert!(!rows[0].has_rows());
}

#[tokio::test]
async fn test_cancel_long_running_query() {
    let (_dir, client) = setup().await;

    let query: Arc<dyn omniql_core::CancelableQuery> = Arc::from(
        client
            .query(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                 SELECT COUNT(*) FROM n",
            )
            .await
            .unwrap(),
    );

    let running = tokio::spawn({
        let query = query.clone();
        async move { query.execute().await }
    });

    for _ in 0..500 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        query.cancel();
        if running.is_finished() {
            break;
        }
    }

    let outcome = running.await.unwrap();
    assert!(matches!(outcome, Err(OmniqlError::Cancelled)));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (_dir, client) = setup().await;

    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();

    let err = client.execute_query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, OmniqlError::Connection(_)));
}

#[tokio::test]
async fn test_query_prepared_before_disconnect_fails() {
    let (_dir, client) = setup().await;
    let query = client.query("SELECT COUNT(*) FROM users").await.unwrap();

    client.disconnect().await.unwrap();

    let err = query.execute().await.unwrap_err();
    assert!(matches!(err, OmniqlError::Connection(ref msg) if msg.contains("closed")));
}

#[tokio::test]
async fn test_read_only_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");

    let mut server = ServerConfig::new("sqlite");
    server.read_only = true;
    let err = SqliteDriver::new()
        .connect(&server, path.to_str().unwrap())
        .await
        .err()
        .expect("read-only open of a missing file should fail");
    assert!(matches!(err, OmniqlError::Connection(_)));
}
