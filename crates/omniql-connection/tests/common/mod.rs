//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use omniql_connection::{ConnectionOrchestrator, Server, Tunnel, TunnelConnector, TunnelHandle};
use omniql_core::security::SshTunnelConfig;
use omniql_core::{
    AlterTableSpec, CancelableQuery, ChangeResult, ClientFeatures, ColumnInfo, ColumnMeta,
    DatabaseClient, DatabaseDriver, DatabaseElement, ForeignKeyInfo, IndexAlterSpec, IndexInfo,
    ObjectFilter, OmniqlError, PrimaryKeyColumn, QueryResult, QueryStream, RelationAlterSpec,
    Result, RoutineInfo, RoutineType, SelectTopRequest, ServerConfig, TableChanges, TableOrView,
    TableProperties, TriggerInfo, Value,
};
use omniql_drivers::DriverRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

pub const TUNNEL_PORT: u16 = 40_000;

/// State shared by a mock driver and every client it constructs
pub struct MockState {
    /// Log of client calls, e.g. `list_tables:app`
    pub calls: Mutex<Vec<String>>,
    pub connect_attempts: AtomicUsize,
    pub constructed: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub fail_connect: AtomicBool,
    /// When set, `connect` waits for a notification before the handshake
    pub gate: Mutex<Option<Arc<Notify>>>,
    /// Effective config and database of every connect attempt
    pub configs: Mutex<Vec<(ServerConfig, String)>>,
    pub features: Mutex<ClientFeatures>,
    pub tables: Mutex<Vec<String>>,
    pub columns: Mutex<Vec<String>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            connect_attempts: AtomicUsize::new(0),
            constructed: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            gate: Mutex::new(None),
            configs: Mutex::new(Vec::new()),
            features: Mutex::new(ClientFeatures::default()),
            tables: Mutex::new(vec!["users".to_string()]),
            columns: Mutex::new(vec!["id".to_string(), "name".to_string()]),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_connect.store(failing, Ordering::SeqCst);
    }

    /// Hold every following connect until the returned notify fires
    pub fn close_gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub async fn wait_for_attempts(&self, attempts: usize) {
        while self.attempts() < attempts {
            tokio::task::yield_now().await;
        }
    }
}

/// Mock client recording every call; quotes identifiers with backticks
pub struct MockClient {
    state: Arc<MockState>,
}

impl MockClient {
    fn call(&self, name: impl Into<String>) {
        self.state.calls.lock().push(name.into());
    }

    fn rows(&self) -> QueryResult {
        QueryResult::from_rows(
            vec![ColumnMeta::new("id", 0)],
            vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]],
        )
    }
}

struct MockQuery;

#[async_trait]
impl CancelableQuery for MockQuery {
    async fn execute(&self) -> Result<Vec<QueryResult>> {
        Ok(vec![QueryResult::empty()])
    }

    fn cancel(&self) {}
}

#[async_trait]
impl DatabaseClient for MockClient {
    fn engine(&self) -> &str {
        "mock"
    }

    fn features(&self) -> ClientFeatures {
        *self.state.features.lock()
    }

    fn wrap_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.call("disconnect");
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn version_string(&self) -> Result<String> {
        self.call("version_string");
        Ok("Mock 1.0".to_string())
    }

    async fn list_databases(&self, _filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        self.call("list_databases");
        Ok(vec!["app".to_string()])
    }

    async fn list_schemas(
        &self,
        database: &str,
        _filter: Option<&ObjectFilter>,
    ) -> Result<Vec<String>> {
        self.call(format!("list_schemas:{database}"));
        Ok(vec!["public".to_string()])
    }

    async fn list_tables(
        &self,
        database: &str,
        _filter: Option<&ObjectFilter>,
    ) -> Result<Vec<TableOrView>> {
        self.call(format!("list_tables:{database}"));
        Ok(self
            .state
            .tables
            .lock()
            .iter()
            .map(|name| TableOrView::table(Some("public".to_string()), name.clone()))
            .collect())
    }

    async fn list_views(&self, _filter: Option<&ObjectFilter>) -> Result<Vec<TableOrView>> {
        self.call("list_views");
        Ok(Vec::new())
    }

    async fn list_materialized_views(
        &self,
        _filter: Option<&ObjectFilter>,
    ) -> Result<Vec<TableOrView>> {
        self.call("list_materialized_views");
        Ok(vec![TableOrView::view(None, "mv_sales")])
    }

    async fn list_routines(&self, _filter: Option<&ObjectFilter>) -> Result<Vec<RoutineInfo>> {
        self.call("list_routines");
        Ok(Vec::new())
    }

    async fn list_table_columns(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        self.call(format!("list_table_columns:{table}"));
        if !self.state.tables.lock().iter().any(|t| t == table) {
            return Err(OmniqlError::NotFound(format!("table '{table}'")));
        }
        Ok(self
            .state
            .columns
            .lock()
            .iter()
            .enumerate()
            .map(|(ordinal, name)| ColumnInfo::new(name.clone(), "text", ordinal))
            .collect())
    }

    async fn list_table_triggers(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<TriggerInfo>> {
        self.call("list_table_triggers");
        Ok(Vec::new())
    }

    async fn list_table_indexes(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<IndexInfo>> {
        self.call("list_table_indexes");
        Ok(Vec::new())
    }

    async fn get_primary_key(&self, _table: &str, _schema: Option<&str>) -> Result<Option<String>> {
        self.call("get_primary_key");
        Ok(Some("id".to_string()))
    }

    async fn get_primary_keys(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<PrimaryKeyColumn>> {
        self.call("get_primary_keys");
        Ok(Vec::new())
    }

    async fn get_table_keys(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>> {
        self.call("get_table_keys");
        Ok(Vec::new())
    }

    async fn get_table_references(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>> {
        self.call("get_table_references");
        Ok(Vec::new())
    }

    async fn get_table_properties(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<TableProperties> {
        self.call("get_table_properties");
        Ok(TableProperties::default())
    }

    async fn get_table_create_script(&self, table: &str, _schema: Option<&str>) -> Result<String> {
        self.call("get_table_create_script");
        Ok(format!("CREATE TABLE {table} ();"))
    }

    async fn get_view_create_script(&self, view: &str, _schema: Option<&str>) -> Result<String> {
        self.call("get_view_create_script");
        Ok(format!("CREATE VIEW {view} AS SELECT 1;"))
    }

    async fn get_routine_create_script(
        &self,
        _routine: &str,
        _routine_type: RoutineType,
        _schema: Option<&str>,
    ) -> Result<String> {
        self.call("get_routine_create_script");
        Err(OmniqlError::NotSupported("routines".into()))
    }

    async fn select_top(&self, request: &SelectTopRequest) -> Result<QueryResult> {
        self.call(format!("select_top:{}", request.table));
        Ok(self.rows())
    }

    async fn select_top_stream(
        &self,
        database: &str,
        request: &SelectTopRequest,
        chunk_size: usize,
    ) -> Result<QueryStream> {
        self.call(format!(
            "select_top_stream:{database}:{}:{chunk_size}",
            request.table
        ));
        Ok(QueryStream::from_result(self.rows(), chunk_size))
    }

    async fn query_stream(
        &self,
        database: &str,
        _sql: &str,
        chunk_size: usize,
    ) -> Result<QueryStream> {
        self.call(format!("query_stream:{database}:{chunk_size}"));
        Ok(QueryStream::from_result(self.rows(), chunk_size))
    }

    async fn query(&self, _sql: &str) -> Result<Box<dyn CancelableQuery>> {
        self.call("query");
        Ok(Box::new(MockQuery))
    }

    async fn execute_query(&self, sql: &str) -> Result<Vec<QueryResult>> {
        self.call(format!("execute_query:{sql}"));
        if sql.contains("syntax error") {
            return Err(OmniqlError::Query("near \"syntax\": syntax error".into()));
        }
        Ok(vec![self.rows()])
    }

    async fn apply_changes(&self, changes: &TableChanges) -> Result<Vec<ChangeResult>> {
        self.call(format!("apply_changes:{}", changes.len()));
        Ok(Vec::new())
    }

    fn apply_changes_sql(&self, _changes: &TableChanges) -> Result<String> {
        self.call("apply_changes_sql");
        Ok(String::new())
    }

    fn alter_table_sql(&self, spec: &AlterTableSpec) -> Result<String> {
        self.call("alter_table_sql");
        Ok(format!("ALTER TABLE {};", spec.table))
    }

    fn alter_index_sql(&self, _spec: &IndexAlterSpec) -> Result<String> {
        self.call("alter_index_sql");
        Ok(String::new())
    }

    fn alter_relation_sql(&self, _spec: &RelationAlterSpec) -> Result<String> {
        self.call("alter_relation_sql");
        Ok(String::new())
    }

    async fn drop_element(
        &self,
        name: &str,
        _element: DatabaseElement,
        _schema: Option<&str>,
    ) -> Result<()> {
        self.call(format!("drop_element:{name}"));
        Ok(())
    }

    async fn truncate_element(
        &self,
        name: &str,
        _element: DatabaseElement,
        _schema: Option<&str>,
    ) -> Result<()> {
        self.call(format!("truncate_element:{name}"));
        Ok(())
    }

    async fn truncate_all_tables(&self, database: &str, _schema: Option<&str>) -> Result<()> {
        self.call(format!("truncate_all_tables:{database}"));
        Ok(())
    }

    fn duplicate_table_sql(&self, table: &str, _schema: Option<&str>, new_name: &str) -> Result<String> {
        self.call("duplicate_table_sql");
        Ok(format!("CREATE TABLE {new_name} AS SELECT * FROM {table};"))
    }
}

/// Mock driver constructing [`MockClient`]s
pub struct MockDriver {
    id: &'static str,
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn new(id: &'static str, state: Arc<MockState>) -> Self {
        Self { id, state }
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn id(&self) -> &'static str {
        self.id
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    async fn connect(
        &self,
        server: &ServerConfig,
        database: &str,
    ) -> Result<Arc<dyn DatabaseClient>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.state
            .configs
            .lock()
            .push((server.clone(), database.to_string()));

        let gate = self.state.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(OmniqlError::Connection(format!(
                "{} refused {database}",
                self.id
            )));
        }

        self.state.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClient {
            state: self.state.clone(),
        }))
    }
}

/// Mock tunnel connector counting invocations and shutdowns
pub struct MockTunnelConnector {
    pub invocations: AtomicUsize,
    pub shutdowns: Arc<AtomicUsize>,
    pub fail: AtomicBool,
}

impl MockTunnelConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            fail: AtomicBool::new(false),
        })
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

struct MockTunnelHandle {
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl TunnelHandle for MockTunnelHandle {
    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TunnelConnector for MockTunnelConnector {
    async fn connect_tunnel(&self, server: &ServerConfig) -> Result<Tunnel> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(OmniqlError::Tunnel(format!(
                "mock tunnel to {:?} refused",
                server.host
            )));
        }
        Ok(Tunnel::new(
            "127.0.0.1",
            TUNNEL_PORT,
            Box::new(MockTunnelHandle {
                shutdowns: self.shutdowns.clone(),
            }),
        ))
    }
}

/// Registry holding a single mock driver registered as `engine`
pub fn registry(engine: &'static str, state: &Arc<MockState>) -> Arc<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(MockDriver::new(engine, state.clone())));
    Arc::new(registry)
}

pub fn orchestrator(
    engine: &'static str,
    state: &Arc<MockState>,
    tunnels: &Arc<MockTunnelConnector>,
) -> ConnectionOrchestrator {
    ConnectionOrchestrator::new(registry(engine, state)).with_tunnels(tunnels.clone())
}

pub fn plain_server(engine: &str) -> Server {
    Server::new(ServerConfig::new(engine).host("db.internal").port(5432))
}

pub fn ssh_server(engine: &str) -> Server {
    Server::new(
        ServerConfig::new(engine)
            .host("db.internal")
            .port(5432)
            .ssh(SshTunnelConfig::with_password(
                "bastion.example.com",
                "deploy",
                "secret",
            )),
    )
}
