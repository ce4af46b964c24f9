//! Per-database session: the public surface over a bound client

use omniql_core::{
    AlterTableSpec, CancelableQuery, ChangeResult, ClientFeatures, ColumnInfo, DatabaseClient,
    DatabaseElement, ForeignKeyInfo, IndexAlterSpec, IndexInfo, ObjectFilter, OmniqlError,
    PartitionAlterSpec, PartitionInfo, PrimaryKeyColumn, QueryResult, QueryStream,
    RelationAlterSpec, Result, RoutineInfo, RoutineType, SelectTopRequest, TableChanges,
    TableOrView, TableProperties, TriggerInfo,
};
use parking_lot::RwLock;
use std::sync::Arc;

struct SessionState {
    connecting: bool,
    client: Option<Arc<dyn DatabaseClient>>,
    // Bumped by every connect attempt and every release, so an attempt can
    // tell whether a disconnect superseded it.
    epoch: u64,
}

/// One database of a server.
///
/// Every operation first checks that a client is bound and no connect is in
/// flight, failing with [`OmniqlError::NotConnected`] before any I/O. Results
/// and errors of the client are returned unchanged.
pub struct DatabaseSession {
    database: String,
    engine: String,
    default_chunk_size: usize,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for DatabaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("DatabaseSession")
            .field("database", &self.database)
            .field("engine", &self.engine)
            .field("connecting", &state.connecting)
            .field("connected", &state.client.is_some())
            .finish()
    }
}

impl DatabaseSession {
    pub(crate) fn new(
        database: impl Into<String>,
        engine: impl Into<String>,
        default_chunk_size: usize,
    ) -> Self {
        Self {
            database: database.into(),
            engine: engine.into(),
            default_chunk_size: default_chunk_size.max(1),
            state: RwLock::new(SessionState {
                connecting: false,
                client: None,
                epoch: 0,
            }),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn is_connected(&self) -> bool {
        let state = self.state.read();
        !state.connecting && state.client.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.state.read().connecting
    }

    fn client(&self) -> Result<Arc<dyn DatabaseClient>> {
        let state = self.state.read();
        if state.connecting {
            return Err(OmniqlError::NotConnected(self.database.clone()));
        }
        state
            .client
            .clone()
            .ok_or_else(|| OmniqlError::NotConnected(self.database.clone()))
    }

    fn chunk_size(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_chunk_size).max(1)
    }

    /// Marks a connect attempt as started, handing back its epoch and any
    /// stale client to dispose of.
    pub(crate) fn begin_connect(&self) -> Result<(u64, Option<Arc<dyn DatabaseClient>>)> {
        let mut state = self.state.write();
        if state.connecting {
            return Err(OmniqlError::ConnectionInProgress(self.database.clone()));
        }
        state.connecting = true;
        state.epoch += 1;
        Ok((state.epoch, state.client.take()))
    }

    /// Whether the attempt started at `epoch` still owns the session
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        let state = self.state.read();
        state.connecting && state.epoch == epoch
    }

    /// Stores the client of a current attempt; false when superseded
    pub(crate) fn bind(&self, epoch: u64, client: Arc<dyn DatabaseClient>) -> bool {
        let mut state = self.state.write();
        if !state.connecting || state.epoch != epoch {
            return false;
        }
        state.client = Some(client);
        true
    }

    pub(crate) fn finish_connect(&self, epoch: u64) {
        let mut state = self.state.write();
        if state.epoch == epoch {
            state.connecting = false;
        }
    }

    /// Clears the connecting flag and hands back the bound client
    pub(crate) fn release(&self) -> Option<Arc<dyn DatabaseClient>> {
        let mut state = self.state.write();
        state.connecting = false;
        state.epoch += 1;
        state.client.take()
    }

    // Identity

    pub fn features(&self) -> Result<ClientFeatures> {
        Ok(self.client()?.features())
    }

    pub async fn version_string(&self) -> Result<String> {
        self.client()?.version_string().await
    }

    pub fn wrap_identifier(&self, identifier: &str) -> Result<String> {
        Ok(self.client()?.wrap_identifier(identifier))
    }

    // Metadata

    pub async fn list_databases(&self, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        self.client()?.list_databases(filter).await
    }

    pub async fn list_schemas(&self, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        self.client()?.list_schemas(&self.database, filter).await
    }

    pub async fn list_tables(&self, filter: Option<&ObjectFilter>) -> Result<Vec<TableOrView>> {
        self.client()?.list_tables(&self.database, filter).await
    }

    pub async fn list_views(&self, filter: Option<&ObjectFilter>) -> Result<Vec<TableOrView>> {
        self.client()?.list_views(filter).await
    }

    /// Empty when the engine has no materialized views
    pub async fn list_materialized_views(
        &self,
        filter: Option<&ObjectFilter>,
    ) -> Result<Vec<TableOrView>> {
        let client = self.client()?;
        if !client.features().materialized_views {
            return Ok(Vec::new());
        }
        client.list_materialized_views(filter).await
    }

    pub async fn list_routines(&self, filter: Option<&ObjectFilter>) -> Result<Vec<RoutineInfo>> {
        self.client()?.list_routines(filter).await
    }

    pub async fn list_table_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        self.client()?.list_table_columns(table, schema).await
    }

    /// Empty when the engine has no materialized views
    pub async fn list_materialized_view_columns(
        &self,
        view: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        let client = self.client()?;
        if !client.features().materialized_views {
            return Ok(Vec::new());
        }
        client.list_materialized_view_columns(view, schema).await
    }

    pub async fn list_table_triggers(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TriggerInfo>> {
        self.client()?.list_table_triggers(table, schema).await
    }

    pub async fn list_table_indexes(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<IndexInfo>> {
        self.client()?.list_table_indexes(table, schema).await
    }

    /// Empty when the engine has no partitions
    pub async fn list_table_partitions(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<PartitionInfo>> {
        let client = self.client()?;
        if !client.features().partitions {
            return Ok(Vec::new());
        }
        client.list_table_partitions(table, schema).await
    }

    pub async fn get_primary_key(&self, table: &str, schema: Option<&str>) -> Result<Option<String>> {
        self.client()?.get_primary_key(table, schema).await
    }

    pub async fn get_primary_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<PrimaryKeyColumn>> {
        self.client()?.get_primary_keys(table, schema).await
    }

    pub async fn get_table_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>> {
        self.client()?.get_table_keys(table, schema).await
    }

    pub async fn get_table_references(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>> {
        self.client()?.get_table_references(table, schema).await
    }

    pub async fn get_table_properties(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<TableProperties> {
        self.client()?.get_table_properties(table, schema).await
    }

    pub async fn get_table_create_script(&self, table: &str, schema: Option<&str>) -> Result<String> {
        self.client()?.get_table_create_script(table, schema).await
    }

    pub async fn get_view_create_script(&self, view: &str, schema: Option<&str>) -> Result<String> {
        self.client()?.get_view_create_script(view, schema).await
    }

    /// `None` when the engine has no materialized views
    pub async fn get_materialized_view_create_script(
        &self,
        view: &str,
        schema: Option<&str>,
    ) -> Result<Option<String>> {
        let client = self.client()?;
        if !client.features().materialized_views {
            return Ok(None);
        }
        client
            .get_materialized_view_create_script(view, schema)
            .await
            .map(Some)
    }

    pub async fn get_routine_create_script(
        &self,
        routine: &str,
        routine_type: RoutineType,
        schema: Option<&str>,
    ) -> Result<String> {
        self.client()?
            .get_routine_create_script(routine, routine_type, schema)
            .await
    }

    // Data access

    pub async fn select_top(&self, request: &SelectTopRequest) -> Result<QueryResult> {
        self.client()?.select_top(request).await
    }

    /// Streams a top-N select; `chunk_size` defaults to the configured size
    pub async fn select_top_stream(
        &self,
        request: &SelectTopRequest,
        chunk_size: Option<usize>,
    ) -> Result<QueryStream> {
        let client = self.client()?;
        client
            .select_top_stream(&self.database, request, self.chunk_size(chunk_size))
            .await
    }

    #[tracing::instrument(skip(self, sql), fields(database = %self.database, sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn query_stream(&self, sql: &str, chunk_size: Option<usize>) -> Result<QueryStream> {
        let client = self.client()?;
        client
            .query_stream(&self.database, sql, self.chunk_size(chunk_size))
            .await
    }

    pub async fn query(&self, sql: &str) -> Result<Box<dyn CancelableQuery>> {
        self.client()?.query(sql).await
    }

    #[tracing::instrument(skip(self, sql), fields(database = %self.database, sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn execute_query(&self, sql: &str) -> Result<Vec<QueryResult>> {
        self.client()?.execute_query(sql).await
    }

    // Changes and DDL

    pub async fn apply_changes(&self, changes: &TableChanges) -> Result<Vec<ChangeResult>> {
        self.client()?.apply_changes(changes).await
    }

    pub fn apply_changes_sql(&self, changes: &TableChanges) -> Result<String> {
        self.client()?.apply_changes_sql(changes)
    }

    pub fn alter_table_sql(&self, spec: &AlterTableSpec) -> Result<String> {
        self.client()?.alter_table_sql(spec)
    }

    pub async fn alter_table(&self, spec: &AlterTableSpec) -> Result<()> {
        self.client()?.alter_table(spec).await
    }

    pub fn alter_index_sql(&self, spec: &IndexAlterSpec) -> Result<String> {
        self.client()?.alter_index_sql(spec)
    }

    pub async fn alter_index(&self, spec: &IndexAlterSpec) -> Result<()> {
        self.client()?.alter_index(spec).await
    }

    pub fn alter_relation_sql(&self, spec: &RelationAlterSpec) -> Result<String> {
        self.client()?.alter_relation_sql(spec)
    }

    pub async fn alter_relation(&self, spec: &RelationAlterSpec) -> Result<()> {
        self.client()?.alter_relation(spec).await
    }

    pub fn alter_partition_sql(&self, spec: &PartitionAlterSpec) -> Result<String> {
        self.client()?.alter_partition_sql(spec)
    }

    pub async fn alter_partition(&self, spec: &PartitionAlterSpec) -> Result<()> {
        self.client()?.alter_partition(spec).await
    }

    // Destructive operations

    pub async fn drop_element(
        &self,
        name: &str,
        element: DatabaseElement,
        schema: Option<&str>,
    ) -> Result<()> {
        self.client()?.drop_element(name, element, schema).await
    }

    pub async fn truncate_element(
        &self,
        name: &str,
        element: DatabaseElement,
        schema: Option<&str>,
    ) -> Result<()> {
        self.client()?.truncate_element(name, element, schema).await
    }

    pub async fn truncate_all_tables(&self, schema: Option<&str>) -> Result<()> {
        self.client()?
            .truncate_all_tables(&self.database, schema)
            .await
    }

    /// `None` when the engine cannot duplicate tables
    pub fn duplicate_table_sql(
        &self,
        table: &str,
        schema: Option<&str>,
        new_name: &str,
    ) -> Result<Option<String>> {
        let client = self.client()?;
        if !client.features().duplicate_table {
            return Ok(None);
        }
        client.duplicate_table_sql(table, schema, new_name).map(Some)
    }

    /// `false` when the engine cannot duplicate tables
    pub async fn duplicate_table(
        &self,
        table: &str,
        schema: Option<&str>,
        new_name: &str,
    ) -> Result<bool> {
        let client = self.client()?;
        if !client.features().duplicate_table {
            return Ok(false);
        }
        client.duplicate_table(table, schema, new_name).await?;
        Ok(true)
    }
}
