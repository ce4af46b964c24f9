//! The capability contract every engine client implements

use crate::{
    AlterTableSpec, ChangeResult, ColumnInfo, DatabaseElement, ForeignKeyInfo, IndexAlterSpec,
    IndexInfo, ObjectFilter, OmniqlError, PartitionAlterSpec, PartitionInfo, PrimaryKeyColumn,
    QueryResult, QueryStream, RelationAlterSpec, Result, RoutineInfo, RoutineType,
    SelectTopRequest, TableChanges, TableOrView, TableProperties, TriggerInfo,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Optional features a client implements beyond the mandatory baseline.
///
/// Sessions consult these flags instead of probing the client at call time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFeatures {
    pub materialized_views: bool,
    pub partitions: bool,
    pub duplicate_table: bool,
    pub triggers: bool,
    pub indexes: bool,
    pub relations: bool,
    pub routines: bool,
    pub schemas: bool,
    pub streaming: bool,
    pub cancelable_queries: bool,
    pub transactions: bool,
}

/// Interrupts a running statement. Callable from any thread.
pub trait QueryCancelHandle: Send + Sync {
    fn cancel(&self);
}

/// A prepared statement whose execution can be cancelled from elsewhere
#[async_trait]
pub trait CancelableQuery: Send + Sync {
    async fn execute(&self) -> Result<Vec<QueryResult>>;

    fn cancel(&self);
}

pub(crate) fn unsupported(engine: &str, what: &str) -> OmniqlError {
    OmniqlError::NotSupported(format!("{what} is not supported by {engine}"))
}

/// A live connection to one database of one engine.
///
/// Methods without a default are the mandatory relational surface. Methods
/// with a default either fail with `NotSupported` (the matching
/// `ClientFeatures` flag is off) or apply SQL produced by their `_sql`
/// counterpart through `execute_query`.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Engine identifier, e.g. "sqlite"
    fn engine(&self) -> &str;

    fn features(&self) -> ClientFeatures;

    /// Quotes one identifier in this engine's dialect
    fn wrap_identifier(&self, identifier: &str) -> String;

    async fn disconnect(&self) -> Result<()>;

    async fn version_string(&self) -> Result<String>;

    // Metadata

    async fn list_databases(&self, filter: Option<&ObjectFilter>) -> Result<Vec<String>>;

    async fn list_schemas(
        &self,
        database: &str,
        filter: Option<&ObjectFilter>,
    ) -> Result<Vec<String>>;

    async fn list_tables(
        &self,
        database: &str,
        filter: Option<&ObjectFilter>,
    ) -> Result<Vec<TableOrView>>;

    async fn list_views(&self, filter: Option<&ObjectFilter>) -> Result<Vec<TableOrView>>;

    async fn list_materialized_views(
        &self,
        _filter: Option<&ObjectFilter>,
    ) -> Result<Vec<TableOrView>> {
        Err(unsupported(self.engine(), "Materialized views"))
    }

    async fn list_routines(&self, filter: Option<&ObjectFilter>) -> Result<Vec<RoutineInfo>>;

    async fn list_table_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>>;

    async fn list_materialized_view_columns(
        &self,
        _view: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        Err(unsupported(self.engine(), "Materialized views"))
    }

    async fn list_table_triggers(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TriggerInfo>>;

    async fn list_table_indexes(&self, table: &str, schema: Option<&str>)
    -> Result<Vec<IndexInfo>>;

    async fn list_table_partitions(
        &self,
        _table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<PartitionInfo>> {
        Err(unsupported(self.engine(), "Partitions"))
    }

    /// Single-column primary key name, `None` for keyless or composite keys
    async fn get_primary_key(&self, table: &str, schema: Option<&str>) -> Result<Option<String>>;

    async fn get_primary_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<PrimaryKeyColumn>>;

    /// Foreign keys declared on `table`
    async fn get_table_keys(&self, table: &str, schema: Option<&str>)
    -> Result<Vec<ForeignKeyInfo>>;

    /// Foreign keys in other tables that point at `table`
    async fn get_table_references(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>>;

    async fn get_table_properties(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<TableProperties>;

    async fn get_table_create_script(&self, table: &str, schema: Option<&str>) -> Result<String>;

    async fn get_view_create_script(&self, view: &str, schema: Option<&str>) -> Result<String>;

    async fn get_materialized_view_create_script(
        &self,
        _view: &str,
        _schema: Option<&str>,
    ) -> Result<String> {
        Err(unsupported(self.engine(), "Materialized views"))
    }

    async fn get_routine_create_script(
        &self,
        routine: &str,
        routine_type: RoutineType,
        schema: Option<&str>,
    ) -> Result<String>;

    // Data access

    async fn select_top(&self, request: &SelectTopRequest) -> Result<QueryResult>;

    async fn select_top_stream(
        &self,
        database: &str,
        request: &SelectTopRequest,
        chunk_size: usize,
    ) -> Result<QueryStream>;

    async fn query_stream(&self, database: &str, sql: &str, chunk_size: usize)
    -> Result<QueryStream>;

    /// Prepares `sql` for execution with a cancel affordance
    async fn query(&self, sql: &str) -> Result<Box<dyn CancelableQuery>>;

    /// Runs one or more statements, one result per statement
    async fn execute_query(&self, sql: &str) -> Result<Vec<QueryResult>>;

    // Mutation

    /// Applies every change or none of them
    async fn apply_changes(&self, changes: &TableChanges) -> Result<Vec<ChangeResult>>;

    fn apply_changes_sql(&self, changes: &TableChanges) -> Result<String>;

    // DDL

    fn alter_table_sql(&self, spec: &AlterTableSpec) -> Result<String>;

    async fn alter_table(&self, spec: &AlterTableSpec) -> Result<()> {
        let sql = self.alter_table_sql(spec)?;
        run_generated(self, &sql).await
    }

    fn alter_index_sql(&self, spec: &IndexAlterSpec) -> Result<String>;

    async fn alter_index(&self, spec: &IndexAlterSpec) -> Result<()> {
        let sql = self.alter_index_sql(spec)?;
        run_generated(self, &sql).await
    }

    fn alter_relation_sql(&self, spec: &RelationAlterSpec) -> Result<String>;

    async fn alter_relation(&self, spec: &RelationAlterSpec) -> Result<()> {
        let sql = self.alter_relation_sql(spec)?;
        run_generated(self, &sql).await
    }

    fn alter_partition_sql(&self, _spec: &PartitionAlterSpec) -> Result<String> {
        Err(unsupported(self.engine(), "Partitions"))
    }

    async fn alter_partition(&self, spec: &PartitionAlterSpec) -> Result<()> {
        let sql = self.alter_partition_sql(spec)?;
        run_generated(self, &sql).await
    }

    // Destructive

    async fn drop_element(
        &self,
        name: &str,
        element: DatabaseElement,
        schema: Option<&str>,
    ) -> Result<()>;

    async fn truncate_element(
        &self,
        name: &str,
        element: DatabaseElement,
        schema: Option<&str>,
    ) -> Result<()>;

    async fn truncate_all_tables(&self, database: &str, schema: Option<&str>) -> Result<()>;

    fn duplicate_table_sql(
        &self,
        _table: &str,
        _schema: Option<&str>,
        _new_name: &str,
    ) -> Result<String> {
        Err(unsupported(self.engine(), "Duplicating tables"))
    }

    async fn duplicate_table(&self, table: &str, schema: Option<&str>, new_name: &str) -> Result<()> {
        let sql = self.duplicate_table_sql(table, schema, new_name)?;
        run_generated(self, &sql).await
    }
}

async fn run_generated<C: DatabaseClient + ?Sized>(client: &C, sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Ok(());
    }
    client.execute_query(sql).await.map(|_| ())
}
