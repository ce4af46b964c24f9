//! SQLite client implementation

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use omniql_core::{
    AlterTableSpec, CancelableQuery, ChangeResult, ClientFeatures, ColumnInfo, ColumnMeta,
    DatabaseClient, DatabaseElement, ForeignKeyAction, ForeignKeyInfo, IndexAlterSpec, IndexColumn,
    IndexInfo, ObjectFilter, OmniqlError, PrimaryKeyColumn, QueryCancelHandle, QueryResult,
    QueryStream, RelationAlterSpec, Result, RoutineInfo, RoutineType, Row, SelectTopRequest,
    SortOrder, TableChanges, TableOrView, TableProperties, TriggerEvent, TriggerInfo,
    TriggerTiming, Value, statement_command,
};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Batch, Connection, InterruptHandle, OpenFlags, params_from_iter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::sql;

const DEFAULT_SCHEMA: &str = "main";

const READER_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cancel handle for SQLite statements.
///
/// Wraps the rusqlite `InterruptHandle`; the interrupted statement fails with
/// `SQLITE_INTERRUPT`, which surfaces as `OmniqlError::Cancelled`.
pub struct SqliteCancelHandle {
    interrupt_handle: Arc<InterruptHandle>,
}

impl QueryCancelHandle for SqliteCancelHandle {
    fn cancel(&self) {
        tracing::debug!("interrupting SQLite query");
        self.interrupt_handle.interrupt();
    }
}

/// A live SQLite database
pub struct SqliteClient {
    conn: Arc<Mutex<Connection>>,
    interrupt_handle: Arc<InterruptHandle>,
    path: String,
    /// Expanded file location and flags, used to open stream readers.
    /// `None` for in-memory databases, which cannot be shared.
    reader_source: Option<(String, OpenFlags)>,
    closed: Arc<AtomicBool>,
}

impl SqliteClient {
    /// Open a SQLite database file, or `:memory:`
    pub fn open(path: &str, read_only: bool) -> Result<Self> {
        tracing::info!(path = %path, read_only, "opening SQLite database");

        let (conn, reader_source) = if path == ":memory:" {
            let conn = Connection::open_in_memory().map_err(|e| {
                OmniqlError::Connection(format!("Failed to open in-memory database: {e}"))
            })?;
            (conn, None)
        } else {
            let expanded = expand_path(path)?;
            if !expanded.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(OmniqlError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            let access = if read_only {
                OpenFlags::SQLITE_OPEN_READ_ONLY
            } else {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            };
            let flags = access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

            let conn = Connection::open_with_flags(&expanded, flags).map_err(|e| {
                OmniqlError::Connection(format!(
                    "Failed to open SQLite database at '{expanded}': {e}"
                ))
            })?;
            let reader_flags = flags.difference(OpenFlags::SQLITE_OPEN_CREATE);
            (conn, Some((expanded, reader_flags)))
        };

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| OmniqlError::Connection(format!("Failed to enable foreign keys: {e}")))?;

        if !read_only && path != ":memory:" {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| OmniqlError::Connection(format!("Failed to set journal mode: {e}")))?;
        }

        // Taken before the connection moves into the mutex so cancellation
        // never waits on the lock held by the running statement.
        let interrupt_handle = Arc::new(conn.get_interrupt_handle());

        tracing::info!(path = %path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt_handle,
            path: path.to_string(),
            reader_source,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(OmniqlError::Connection(format!(
                "SQLite connection to '{}' is closed",
                self.path
            )));
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.ensure_open()?;
        Ok(self.conn.lock())
    }

    fn cancel_handle(&self) -> Arc<dyn QueryCancelHandle> {
        Arc::new(SqliteCancelHandle {
            interrupt_handle: self.interrupt_handle.clone(),
        })
    }

    /// Runs a row-returning statement and returns the raw values
    fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(query_err)?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(values_to_rusqlite(params)))
            .map_err(query_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_err)? {
            out.push(read_row(row, width)?);
        }
        Ok(out)
    }

    fn master_entries(&self, schema: &str, kind: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            sql::wrap(schema)
        );
        Ok(self
            .fetch(&sql, &[Value::from(kind)])?
            .iter()
            .filter_map(|row| text(row, 0))
            .collect())
    }

    fn master_sql(&self, schema: &str, kind: &str, name: &str) -> Result<String> {
        let sql = format!(
            "SELECT sql FROM {}.sqlite_master WHERE type = ?1 AND name = ?2",
            sql::wrap(schema)
        );
        self.fetch(&sql, &[Value::from(kind), Value::from(name)])?
            .first()
            .and_then(|row| text(row, 0))
            .map(|definition| format!("{definition};"))
            .ok_or_else(|| OmniqlError::NotFound(format!("{kind} '{schema}.{name}'")))
    }

    fn foreign_keys(&self, table: &str, schema: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = self.fetch(
            r#"SELECT "table", "from", COALESCE("to", ''), on_update, on_delete
               FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq"#,
            &[Value::from(table), Value::from(schema)],
        )?;
        Ok(rows
            .iter()
            .map(|row| ForeignKeyInfo {
                constraint_name: None,
                from_schema: Some(schema.to_string()),
                from_table: table.to_string(),
                from_column: text(row, 1).unwrap_or_default(),
                to_schema: Some(schema.to_string()),
                to_table: text(row, 0).unwrap_or_default(),
                to_column: text(row, 2).unwrap_or_default(),
                on_update: ForeignKeyAction::parse(&text(row, 3).unwrap_or_default()),
                on_delete: ForeignKeyAction::parse(&text(row, 4).unwrap_or_default()),
            })
            .collect())
    }

    fn indexes(&self, table: &str, schema: &str) -> Result<Vec<IndexInfo>> {
        let listed = self.fetch(
            r#"SELECT name, "unique", origin FROM pragma_index_list(?1, ?2) ORDER BY name"#,
            &[Value::from(table), Value::from(schema)],
        )?;

        let mut indexes = Vec::with_capacity(listed.len());
        for row in listed {
            let name = text(&row, 0).unwrap_or_default();
            let columns = self
                .fetch(
                    r#"SELECT name, "desc" FROM pragma_index_xinfo(?1, ?2) WHERE key = 1 ORDER BY seqno"#,
                    &[Value::from(name.as_str()), Value::from(schema)],
                )?
                .iter()
                .map(|col| IndexColumn {
                    name: text(col, 0).unwrap_or_else(|| "<expression>".to_string()),
                    order: if int(col, 1) == 1 {
                        SortOrder::Desc
                    } else {
                        SortOrder::Asc
                    },
                })
                .collect();
            indexes.push(IndexInfo {
                name,
                table_name: table.to_string(),
                schema: Some(schema.to_string()),
                columns,
                unique: int(&row, 1) == 1,
                primary: text(&row, 2).as_deref() == Some("pk"),
            });
        }
        Ok(indexes)
    }

    fn triggers(&self, table: &str, schema: &str) -> Result<Vec<TriggerInfo>> {
        let sql = format!(
            "SELECT name, sql FROM {}.sqlite_master WHERE type = 'trigger' AND tbl_name = ?1 ORDER BY name",
            sql::wrap(schema)
        );
        Ok(self
            .fetch(&sql, &[Value::from(table)])?
            .iter()
            .map(|row| {
                let definition = text(row, 1);
                let (timing, events) = definition
                    .as_deref()
                    .map(parse_trigger_header)
                    .unwrap_or((None, Vec::new()));
                TriggerInfo {
                    schema: Some(schema.to_string()),
                    name: text(row, 0).unwrap_or_default(),
                    table_name: table.to_string(),
                    timing,
                    events,
                    definition,
                }
            })
            .collect())
    }

    /// Second connection to the same file for a stream, so the stream never
    /// holds the client's own connection. `None` for in-memory databases.
    fn open_reader(&self) -> Result<Option<Connection>> {
        let Some((location, flags)) = &self.reader_source else {
            return Ok(None);
        };
        let reader = Connection::open_with_flags(location, *flags).map_err(|e| {
            OmniqlError::Connection(format!(
                "Failed to open SQLite stream reader at '{location}': {e}"
            ))
        })?;
        reader
            .busy_timeout(READER_BUSY_TIMEOUT)
            .map_err(|e| OmniqlError::Connection(format!("Failed to set busy timeout: {e}")))?;
        Ok(Some(reader))
    }

    /// Streams `sql` in chunks from a blocking worker.
    ///
    /// File databases stream from a dedicated reader connection owned by the
    /// worker. In-memory databases run the statement up front on the client's
    /// connection and chunk the materialized result.
    async fn spawn_stream(
        &self,
        sql: String,
        params: Vec<Value>,
        chunk_size: usize,
    ) -> Result<QueryStream> {
        self.ensure_open()?;
        let chunk_size = chunk_size.max(1);

        let Some(reader) = self.open_reader()? else {
            let result = {
                let conn = self.lock()?;
                let mut stmt = conn.prepare(&sql).map_err(query_err)?;
                run_statement(&mut stmt, &values_to_rusqlite(&params))?
            };
            return Ok(QueryStream::from_result(result, chunk_size).with_cancel(self.cancel_handle()));
        };

        let cancel: Arc<dyn QueryCancelHandle> = Arc::new(SqliteCancelHandle {
            interrupt_handle: Arc::new(reader.get_interrupt_handle()),
        });
        let (tx, mut rx) = mpsc::channel::<Result<StreamEvent>>(2);

        tokio::task::spawn_blocking(move || {
            if let Err(err) = produce_chunks(&reader, &sql, &params, chunk_size, &tx) {
                let _ = tx.blocking_send(Err(err));
            }
        });

        let columns = match rx.recv().await {
            Some(Ok(StreamEvent::Columns(columns))) => columns,
            Some(Err(err)) => return Err(err),
            Some(Ok(StreamEvent::Rows(_))) | None => {
                return Err(OmniqlError::Driver(
                    "SQLite stream ended before reporting its columns".to_string(),
                ));
            }
        };

        let chunks = stream::unfold(rx, |mut rx| async move {
            let item = match rx.recv().await? {
                Ok(StreamEvent::Rows(rows)) => Ok(rows),
                Ok(StreamEvent::Columns(_)) => Err(OmniqlError::Driver(
                    "SQLite stream reported its columns twice".to_string(),
                )),
                Err(err) => Err(err),
            };
            Some((item, rx))
        })
        .boxed();

        Ok(QueryStream::new(columns, None, chunks).with_cancel(cancel))
    }
}

enum StreamEvent {
    Columns(Vec<ColumnMeta>),
    Rows(Vec<Row>),
}

fn produce_chunks(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    chunk_size: usize,
    tx: &mpsc::Sender<Result<StreamEvent>>,
) -> Result<()> {
    let mut stmt = conn.prepare(sql).map_err(query_err)?;
    let columns = column_meta(&stmt);
    let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
    if tx.blocking_send(Ok(StreamEvent::Columns(columns))).is_err() {
        return Ok(());
    }

    let mut rows = stmt
        .query(params_from_iter(values_to_rusqlite(params)))
        .map_err(query_err)?;
    let mut chunk = Vec::with_capacity(chunk_size);
    while let Some(row) = rows.next().map_err(query_err)? {
        chunk.push(Row::new(names.clone(), read_row(row, names.len())?));
        if chunk.len() == chunk_size
            && tx
                .blocking_send(Ok(StreamEvent::Rows(std::mem::take(&mut chunk))))
                .is_err()
        {
            tracing::debug!("SQLite stream consumer went away");
            return Ok(());
        }
    }
    if !chunk.is_empty() {
        let _ = tx.blocking_send(Ok(StreamEvent::Rows(chunk)));
    }
    Ok(())
}

/// A statement prepared by `DatabaseClient::query`, executed on a blocking worker
struct SqliteQuery {
    conn: Arc<Mutex<Connection>>,
    interrupt_handle: Arc<InterruptHandle>,
    closed: Arc<AtomicBool>,
    path: String,
    sql: String,
}

#[async_trait]
impl CancelableQuery for SqliteQuery {
    async fn execute(&self) -> Result<Vec<QueryResult>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OmniqlError::Connection(format!(
                "SQLite connection to '{}' is closed",
                self.path
            )));
        }
        let conn = Arc::clone(&self.conn);
        let sql = self.sql.clone();
        tokio::task::spawn_blocking(move || execute_script(&conn.lock(), &sql))
            .await
            .map_err(|e| OmniqlError::Driver(format!("SQLite worker failed: {e}")))?
    }

    fn cancel(&self) {
        tracing::debug!("cancelling SQLite query");
        self.interrupt_handle.interrupt();
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn engine(&self) -> &str {
        "sqlite"
    }

    fn features(&self) -> ClientFeatures {
        ClientFeatures {
            materialized_views: false,
            partitions: false,
            duplicate_table: true,
            triggers: true,
            indexes: true,
            relations: false,
            routines: false,
            schemas: true,
            streaming: true,
            cancelable_queries: true,
            transactions: true,
        }
    }

    fn wrap_identifier(&self, identifier: &str) -> String {
        sql::wrap(identifier)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.interrupt_handle.interrupt();
        tracing::info!(path = %self.path, "closing SQLite connection");
        Ok(())
    }

    async fn version_string(&self) -> Result<String> {
        let rows = self.fetch("SELECT sqlite_version()", &[])?;
        let version = rows
            .first()
            .and_then(|row| text(row, 0))
            .ok_or_else(|| OmniqlError::Query("sqlite_version() returned no row".into()))?;
        Ok(format!("SQLite {version}"))
    }

    async fn list_databases(&self, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        let names = self
            .fetch("SELECT name FROM pragma_database_list ORDER BY seq", &[])?
            .iter()
            .filter_map(|row| text(row, 0))
            .filter(|name| filter.is_none_or(|f| f.matches(name)))
            .collect();
        Ok(names)
    }

    async fn list_schemas(
        &self,
        _database: &str,
        filter: Option<&ObjectFilter>,
    ) -> Result<Vec<String>> {
        // Attached databases are SQLite's schemas
        self.list_databases(filter).await
    }

    #[tracing::instrument(skip(self, filter))]
    async fn list_tables(
        &self,
        database: &str,
        filter: Option<&ObjectFilter>,
    ) -> Result<Vec<TableOrView>> {
        let schema = schema_of(filter);
        let tables: Vec<TableOrView> = self
            .master_entries(schema, "table")?
            .into_iter()
            .filter(|name| filter.is_none_or(|f| f.matches(name)))
            .map(|name| TableOrView::table(Some(schema.to_string()), name))
            .collect();
        tracing::debug!(table_count = tables.len(), "tables listed");
        Ok(tables)
    }

    async fn list_views(&self, filter: Option<&ObjectFilter>) -> Result<Vec<TableOrView>> {
        let schema = schema_of(filter);
        Ok(self
            .master_entries(schema, "view")?
            .into_iter()
            .filter(|name| filter.is_none_or(|f| f.matches(name)))
            .map(|name| TableOrView::view(Some(schema.to_string()), name))
            .collect())
    }

    async fn list_routines(&self, _filter: Option<&ObjectFilter>) -> Result<Vec<RoutineInfo>> {
        Ok(Vec::new())
    }

    async fn list_table_columns(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let rows = self.fetch(
            r#"SELECT cid, name, type, "notnull", dflt_value FROM pragma_table_info(?1, ?2) ORDER BY cid"#,
            &[Value::from(table), Value::from(schema)],
        )?;
        if rows.is_empty() {
            return Err(OmniqlError::NotFound(format!("table '{schema}.{table}'")));
        }
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                column_name: text(row, 1).unwrap_or_default(),
                data_type: text(row, 2).unwrap_or_default(),
                nullable: int(row, 3) == 0,
                default_value: text(row, 4),
                ordinal: int(row, 0) as usize,
                comment: None,
            })
            .collect())
    }

    async fn list_table_triggers(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TriggerInfo>> {
        self.triggers(table, schema.unwrap_or(DEFAULT_SCHEMA))
    }

    async fn list_table_indexes(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<IndexInfo>> {
        self.indexes(table, schema.unwrap_or(DEFAULT_SCHEMA))
    }

    async fn get_primary_key(&self, table: &str, schema: Option<&str>) -> Result<Option<String>> {
        let keys = self.get_primary_keys(table, schema).await?;
        Ok(match keys.as_slice() {
            [only] => Some(only.column_name.clone()),
            _ => None,
        })
    }

    async fn get_primary_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<PrimaryKeyColumn>> {
        let rows = self.fetch(
            "SELECT name, pk FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
            &[Value::from(table), Value::from(schema.unwrap_or(DEFAULT_SCHEMA))],
        )?;
        Ok(rows
            .iter()
            .map(|row| PrimaryKeyColumn {
                column_name: text(row, 0).unwrap_or_default(),
                position: int(row, 1) as usize,
            })
            .collect())
    }

    async fn get_table_keys(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>> {
        self.foreign_keys(table, schema.unwrap_or(DEFAULT_SCHEMA))
    }

    async fn get_table_references(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ForeignKeyInfo>> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let mut references = Vec::new();
        for other in self.master_entries(schema, "table")? {
            references.extend(
                self.foreign_keys(&other, schema)?
                    .into_iter()
                    .filter(|fk| fk.to_table == table),
            );
        }
        Ok(references)
    }

    async fn get_table_properties(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<TableProperties> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let count_sql = format!("SELECT COUNT(*) FROM {}", sql::table_name(Some(schema), table));
        let row_count = self
            .fetch(&count_sql, &[])?
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .map(|n| n as u64);

        Ok(TableProperties {
            description: None,
            row_count,
            size_bytes: None,
            owner: None,
            indexes: self.indexes(table, schema)?,
            relations: self.foreign_keys(table, schema)?,
            triggers: self.triggers(table, schema)?,
            partitions: Vec::new(),
        })
    }

    async fn get_table_create_script(&self, table: &str, schema: Option<&str>) -> Result<String> {
        self.master_sql(schema.unwrap_or(DEFAULT_SCHEMA), "table", table)
    }

    async fn get_view_create_script(&self, view: &str, schema: Option<&str>) -> Result<String> {
        self.master_sql(schema.unwrap_or(DEFAULT_SCHEMA), "view", view)
    }

    async fn get_routine_create_script(
        &self,
        routine: &str,
        _routine_type: RoutineType,
        _schema: Option<&str>,
    ) -> Result<String> {
        Err(OmniqlError::NotSupported(format!(
            "SQLite has no stored routines (requested '{routine}')"
        )))
    }

    #[tracing::instrument(skip(self, request), fields(table = %request.table, limit = request.limit))]
    async fn select_top(&self, request: &SelectTopRequest) -> Result<QueryResult> {
        let (sql, params) = request.to_sql(sql::wrap, |i| format!("?{i}"));
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        run_statement(&mut stmt, &values_to_rusqlite(&params))
    }

    async fn select_top_stream(
        &self,
        _database: &str,
        request: &SelectTopRequest,
        chunk_size: usize,
    ) -> Result<QueryStream> {
        let (sql, params) = request.to_sql(sql::wrap, |i| format!("?{i}"));
        self.spawn_stream(sql, params, chunk_size).await
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query_stream(
        &self,
        _database: &str,
        sql: &str,
        chunk_size: usize,
    ) -> Result<QueryStream> {
        self.spawn_stream(sql.to_string(), Vec::new(), chunk_size)
            .await
    }

    async fn query(&self, sql: &str) -> Result<Box<dyn CancelableQuery>> {
        self.ensure_open()?;
        Ok(Box::new(SqliteQuery {
            conn: Arc::clone(&self.conn),
            interrupt_handle: Arc::clone(&self.interrupt_handle),
            closed: Arc::clone(&self.closed),
            path: self.path.clone(),
            sql: sql.to_string(),
        }))
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute_query(&self, sql: &str) -> Result<Vec<QueryResult>> {
        let conn = self.lock()?;
        execute_script(&conn, sql)
    }

    #[tracing::instrument(skip(self, changes), fields(change_count = changes.len()))]
    async fn apply_changes(&self, changes: &TableChanges) -> Result<Vec<ChangeResult>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut results = Vec::with_capacity(changes.len());
        for change in &changes.changes {
            let mut affected_rows = 0u64;
            for statement in sql::change_statements(change)? {
                affected_rows += tx
                    .execute(
                        &statement.sql,
                        params_from_iter(values_to_rusqlite(&statement.params)),
                    )
                    .map_err(query_err)? as u64;
            }
            results.push(ChangeResult {
                kind: change.kind(),
                table: change.table().to_string(),
                affected_rows,
            });
        }

        tx.commit().map_err(query_err)?;
        tracing::debug!(applied = results.len(), "changes committed");
        Ok(results)
    }

    fn apply_changes_sql(&self, changes: &TableChanges) -> Result<String> {
        sql::apply_changes_sql(changes)
    }

    fn alter_table_sql(&self, spec: &AlterTableSpec) -> Result<String> {
        sql::alter_table_sql(spec)
    }

    fn alter_index_sql(&self, spec: &IndexAlterSpec) -> Result<String> {
        sql::alter_index_sql(spec)
    }

    fn alter_relation_sql(&self, spec: &RelationAlterSpec) -> Result<String> {
        sql::alter_relation_sql(spec)
    }

    async fn drop_element(
        &self,
        name: &str,
        element: DatabaseElement,
        schema: Option<&str>,
    ) -> Result<()> {
        let statement = sql::drop_element_sql(name, element, schema)?;
        self.execute_query(&statement).await.map(|_| ())
    }

    async fn truncate_element(
        &self,
        name: &str,
        element: DatabaseElement,
        schema: Option<&str>,
    ) -> Result<()> {
        let statement = sql::truncate_element_sql(name, element, schema)?;
        self.execute_query(&statement).await.map(|_| ())
    }

    async fn truncate_all_tables(&self, _database: &str, schema: Option<&str>) -> Result<()> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let tables = self.master_entries(schema, "table")?;
        let conn = self.lock()?;

        conn.execute_batch("PRAGMA foreign_keys = OFF")
            .map_err(query_err)?;
        let outcome = (|| -> rusqlite::Result<()> {
            let tx = conn.unchecked_transaction()?;
            for table in &tables {
                tx.execute(&format!("DELETE FROM {}", sql::table_name(Some(schema), table)), [])?;
            }
            tx.commit()
        })();
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(query_err)?;

        outcome.map_err(query_err)?;
        tracing::info!(schema = %schema, table_count = tables.len(), "truncated all tables");
        Ok(())
    }

    fn duplicate_table_sql(&self, table: &str, schema: Option<&str>, new_name: &str) -> Result<String> {
        Ok(sql::duplicate_table_sql(table, schema, new_name))
    }
}

fn schema_of(filter: Option<&ObjectFilter>) -> &str {
    filter
        .and_then(|f| f.schema.as_deref())
        .unwrap_or(DEFAULT_SCHEMA)
}

/// Expand `~/` and make relative paths absolute
fn expand_path(path: &str) -> Result<String> {
    if path.starts_with("file:") {
        return Ok(path.to_string());
    }

    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            OmniqlError::Configuration("Unable to determine HOME directory".into())
        })?;
        home.join(rest)
    } else if path.starts_with('~') {
        return Err(OmniqlError::Configuration(
            "User-specific home directories (~user) are not supported".into(),
        ));
    } else {
        std::path::PathBuf::from(path)
    };

    let absolute = if expanded.is_relative() {
        std::env::current_dir()?.join(expanded)
    } else {
        expanded
    };
    Ok(absolute.to_string_lossy().to_string())
}

fn query_err(err: rusqlite::Error) -> OmniqlError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == rusqlite::ErrorCode::OperationInterrupted =>
        {
            OmniqlError::Cancelled
        }
        other => OmniqlError::Query(other.to_string()),
    }
}

/// Runs every statement of `sql`, one result per statement
fn execute_script(conn: &Connection, sql: &str) -> Result<Vec<QueryResult>> {
    let mut batch = Batch::new(conn, sql);
    let mut results = Vec::new();
    while let Some(mut stmt) = batch.next().map_err(query_err)? {
        results.push(run_statement(&mut stmt, &[])?);
    }
    tracing::debug!(statement_count = results.len(), "script executed");
    Ok(results)
}

fn run_statement(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[rusqlite::types::Value],
) -> Result<QueryResult> {
    let start_time = Instant::now();
    let columns = column_meta(stmt);
    let command = stmt.expanded_sql().as_deref().and_then(statement_command);

    if columns.is_empty() {
        let affected = stmt
            .execute(params_from_iter(params.iter()))
            .map_err(query_err)?;
        return Ok(QueryResult {
            affected_rows: affected as u64,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
            command,
            ..QueryResult::empty()
        });
    }

    let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(query_err)?;
    while let Some(row) = query_rows.next().map_err(query_err)? {
        rows.push(Row::new(names.clone(), read_row(row, names.len())?));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult {
        total_rows: Some(rows.len() as u64),
        columns,
        rows,
        execution_time_ms,
        command,
        ..QueryResult::empty()
    })
}

fn column_meta(stmt: &rusqlite::Statement<'_>) -> Vec<ColumnMeta> {
    stmt.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let meta = ColumnMeta::new(col.name(), idx);
            match col.decl_type() {
                Some(decl) => meta.with_type(decl),
                None => meta,
            }
        })
        .collect()
}

fn read_row(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<Value>> {
    (0..width).map(|idx| rusqlite_to_value(row, idx)).collect()
}

fn text(row: &[Value], idx: usize) -> Option<String> {
    row.get(idx).and_then(Value::as_str).map(str::to_string)
}

fn int(row: &[Value], idx: usize) -> i64 {
    row.get(idx).and_then(Value::as_i64).unwrap_or(0)
}

/// Timing and events from the `CREATE TRIGGER ... ON` header
fn parse_trigger_header(definition: &str) -> (Option<TriggerTiming>, Vec<TriggerEvent>) {
    let upper = definition.to_uppercase();
    let header = &upper[..upper.find(" ON ").unwrap_or(upper.len())];

    let timing = [
        (" INSTEAD OF ", TriggerTiming::InsteadOf),
        (" BEFORE ", TriggerTiming::Before),
        (" AFTER ", TriggerTiming::After),
    ]
    .into_iter()
    .find_map(|(keyword, timing)| header.find(keyword).map(|pos| (pos + keyword.len(), timing)));

    let events_part = match timing {
        Some((pos, _)) => &header[pos..],
        None => header,
    };
    let events = [
        ("INSERT", TriggerEvent::Insert),
        ("UPDATE", TriggerEvent::Update),
        ("DELETE", TriggerEvent::Delete),
    ]
    .into_iter()
    .filter(|(keyword, _)| events_part.split_whitespace().any(|word| word == *keyword))
    .map(|(_, event)| event)
    .collect();

    (timing.map(|(_, timing)| timing), events)
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int(i) => Sql::Integer(*i),
        Value::Float(f) => Sql::Real(*f),
        Value::Decimal(s) | Value::Text(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
        Value::Uuid(u) => Sql::Text(u.to_string()),
        Value::Date(d) => Sql::Text(d.to_string()),
        Value::Time(t) => Sql::Text(t.to_string()),
        Value::DateTime(dt) => Sql::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => Sql::Text(dt.to_rfc3339()),
        Value::Json(j) => Sql::Text(j.to_string()),
        Value::Array(_) => Sql::Null,
    }
}

fn rusqlite_to_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row.get_ref(idx).map_err(query_err)?;
    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}
