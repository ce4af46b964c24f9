//! SQL templates for a table: SELECT, INSERT, UPDATE and DELETE.
//!
//! These are editor boilerplate, not executable statements. Values are `?`
//! placeholders and every WHERE clause is the literal `<condition>` token.
//! Quoting is delegated to the session's engine.

use omniql_core::Result;

use crate::session::DatabaseSession;

const CONDITION: &str = "<condition>";

struct QuotedTable {
    table: String,
    columns: Vec<String>,
}

async fn quote_table(
    session: &DatabaseSession,
    table: &str,
    schema: Option<&str>,
) -> Result<QuotedTable> {
    let schema = schema.filter(|s| !s.is_empty());
    let columns = session.list_table_columns(table, schema).await?;

    let table = match schema {
        Some(schema) => format!(
            "{}.{}",
            session.wrap_identifier(schema)?,
            session.wrap_identifier(table)?
        ),
        None => session.wrap_identifier(table)?,
    };
    let columns = columns
        .iter()
        .map(|column| session.wrap_identifier(&column.column_name))
        .collect::<Result<Vec<_>>>()?;

    Ok(QuotedTable { table, columns })
}

pub async fn table_select_script(
    session: &DatabaseSession,
    table: &str,
    schema: Option<&str>,
) -> Result<String> {
    let quoted = quote_table(session, table, schema).await?;
    Ok(render_select(&quoted.table, &quoted.columns))
}

pub async fn table_insert_script(
    session: &DatabaseSession,
    table: &str,
    schema: Option<&str>,
) -> Result<String> {
    let quoted = quote_table(session, table, schema).await?;
    Ok(render_insert(&quoted.table, &quoted.columns))
}

pub async fn table_update_script(
    session: &DatabaseSession,
    table: &str,
    schema: Option<&str>,
) -> Result<String> {
    let quoted = quote_table(session, table, schema).await?;
    Ok(render_update(&quoted.table, &quoted.columns))
}

/// Resolves columns too, so a missing table fails like the other templates
pub async fn table_delete_script(
    session: &DatabaseSession,
    table: &str,
    schema: Option<&str>,
) -> Result<String> {
    let quoted = quote_table(session, table, schema).await?;
    Ok(render_delete(&quoted.table))
}

/// `SELECT <columns> FROM <table>;` from already quoted names
pub fn render_select(table: &str, columns: &[String]) -> String {
    format!("SELECT {} FROM {};", columns.join(", "), table)
}

/// `INSERT INTO <table> (<columns>) VALUES (?, ...);`, one `?` per column
pub fn render_insert(table: &str, columns: &[String]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        table,
        columns.join(", "),
        placeholders
    )
}

pub fn render_update(table: &str, columns: &[String]) -> String {
    let assignments: Vec<String> = columns.iter().map(|c| format!("{c}=?")).collect();
    format!(
        "UPDATE {} SET {} WHERE {CONDITION};",
        table,
        assignments.join(", ")
    )
}

pub fn render_delete(table: &str) -> String {
    format!("DELETE FROM {table} WHERE {CONDITION};")
}
