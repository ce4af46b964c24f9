//! SQL generation for the SQLite dialect

use omniql_core::dialect::{IdentifierQuote, qualified_name, value_literal};
use omniql_core::{
    AlterTableSpec, ColumnChange, DatabaseElement, IndexAlterSpec, KeyValue, OmniqlError,
    RelationAlterSpec, Result, TableChange, TableChanges, Value,
};

pub(crate) fn wrap(identifier: &str) -> String {
    IdentifierQuote::Double.wrap(identifier)
}

pub(crate) fn table_name(schema: Option<&str>, table: &str) -> String {
    qualified_name(wrap, schema, table)
}

/// One parameterized statement using `?N` markers
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Statements that apply one change. Inserts yield one statement per row.
pub(crate) fn change_statements(change: &TableChange) -> Result<Vec<BoundStatement>> {
    build_statements(change, false)
}

/// Values of one statement, bound as `?N` markers or rendered as literals
struct Binder {
    inline: bool,
    params: Vec<Value>,
}

impl Binder {
    fn new(inline: bool) -> Self {
        Self {
            inline,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &Value) -> String {
        if self.inline {
            return value_literal(value);
        }
        self.params.push(value.clone());
        format!("?{}", self.params.len())
    }

    fn finish(self, sql: String) -> BoundStatement {
        BoundStatement {
            sql,
            params: self.params,
        }
    }
}

fn build_statements(change: &TableChange, inline: bool) -> Result<Vec<BoundStatement>> {
    let target = table_name(change.schema(), change.table());
    match change {
        TableChange::Insert { rows, .. } => rows
            .iter()
            .map(|row| {
                let mut binder = Binder::new(inline);
                if row.is_empty() {
                    return Ok(binder.finish(format!("INSERT INTO {target} DEFAULT VALUES")));
                }
                let columns: Vec<String> = row.iter().map(|(c, _)| wrap(c)).collect();
                let values: Vec<String> = row.iter().map(|(_, v)| binder.bind(v)).collect();
                Ok(binder.finish(format!(
                    "INSERT INTO {target} ({}) VALUES ({})",
                    columns.join(", "),
                    values.join(", ")
                )))
            })
            .collect(),
        TableChange::Update {
            table,
            primary_keys,
            column,
            value,
            ..
        } => {
            let mut binder = Binder::new(inline);
            let assigned = binder.bind(value);
            let condition = key_condition(table, primary_keys, &mut binder)?;
            Ok(vec![binder.finish(format!(
                "UPDATE {target} SET {} = {assigned} WHERE {condition}",
                wrap(column)
            ))])
        }
        TableChange::Delete {
            table,
            primary_keys,
            ..
        } => {
            let mut binder = Binder::new(inline);
            let condition = key_condition(table, primary_keys, &mut binder)?;
            Ok(vec![
                binder.finish(format!("DELETE FROM {target} WHERE {condition}")),
            ])
        }
    }
}

fn key_condition(table: &str, keys: &[KeyValue], binder: &mut Binder) -> Result<String> {
    if keys.is_empty() {
        return Err(OmniqlError::Query(format!(
            "changes to '{table}' need primary key values to identify the row"
        )));
    }
    let parts: Vec<String> = keys
        .iter()
        .map(|key| format!("{} = {}", wrap(&key.column), binder.bind(&key.value)))
        .collect();
    Ok(parts.join(" AND "))
}

/// The batch as executable SQL with every value inlined as a literal
pub(crate) fn apply_changes_sql(changes: &TableChanges) -> Result<String> {
    let mut lines = Vec::new();
    for change in &changes.changes {
        for statement in build_statements(change, true)? {
            lines.push(format!("{};", statement.sql));
        }
    }
    Ok(lines.join("\n"))
}

pub(crate) fn alter_table_sql(spec: &AlterTableSpec) -> Result<String> {
    let target = table_name(spec.schema.as_deref(), &spec.table);
    let mut lines = Vec::new();

    for column in &spec.adds {
        let mut line = format!(
            "ALTER TABLE {target} ADD COLUMN {} {}",
            wrap(&column.name),
            column.data_type
        );
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default_value {
            line.push_str(&format!(" DEFAULT {default}"));
        }
        lines.push(format!("{line};"));
    }

    for alteration in &spec.alterations {
        match &alteration.change {
            ColumnChange::Rename(new_name) => lines.push(format!(
                "ALTER TABLE {target} RENAME COLUMN {} TO {};",
                wrap(&alteration.column),
                wrap(new_name)
            )),
            other => {
                return Err(OmniqlError::NotSupported(format!(
                    "SQLite cannot alter column '{}' in place ({})",
                    alteration.column,
                    change_label(other)
                )));
            }
        }
    }

    for column in &spec.drops {
        lines.push(format!("ALTER TABLE {target} DROP COLUMN {};", wrap(column)));
    }

    Ok(lines.join("\n"))
}

fn change_label(change: &ColumnChange) -> &'static str {
    match change {
        ColumnChange::Rename(_) => "rename",
        ColumnChange::DataType(_) => "data type",
        ColumnChange::Nullable(_) => "nullability",
        ColumnChange::DefaultValue(_) => "default value",
        ColumnChange::Comment(_) => "comment",
    }
}

pub(crate) fn alter_index_sql(spec: &IndexAlterSpec) -> Result<String> {
    let schema = spec.schema.as_deref();
    let mut lines = Vec::new();

    for name in &spec.drops {
        lines.push(format!("DROP INDEX {};", table_name(schema, name)));
    }

    for index in &spec.additions {
        if index.columns.is_empty() {
            return Err(OmniqlError::Query(format!(
                "index '{}' needs at least one column",
                index.name
            )));
        }
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| format!("{} {}", wrap(&c.name), c.order.as_sql()))
            .collect();
        lines.push(format!(
            "CREATE {}INDEX {} ON {} ({});",
            if index.unique { "UNIQUE " } else { "" },
            table_name(schema, &index.name),
            wrap(&spec.table),
            columns.join(", ")
        ));
    }

    Ok(lines.join("\n"))
}

pub(crate) fn alter_relation_sql(spec: &RelationAlterSpec) -> Result<String> {
    if spec.is_empty() {
        return Ok(String::new());
    }
    Err(OmniqlError::NotSupported(
        "SQLite cannot add or drop foreign keys on an existing table".to_string(),
    ))
}

pub(crate) fn drop_element_sql(
    name: &str,
    element: DatabaseElement,
    schema: Option<&str>,
) -> Result<String> {
    match element {
        DatabaseElement::Table | DatabaseElement::View => Ok(format!(
            "DROP {} {};",
            element.keyword(),
            table_name(schema, name)
        )),
        DatabaseElement::Schema => Ok(format!("DETACH DATABASE {};", wrap(name))),
        other => Err(OmniqlError::NotSupported(format!(
            "SQLite cannot drop a {}",
            other.keyword().to_lowercase()
        ))),
    }
}

pub(crate) fn truncate_element_sql(
    name: &str,
    element: DatabaseElement,
    schema: Option<&str>,
) -> Result<String> {
    match element {
        DatabaseElement::Table => Ok(format!("DELETE FROM {};", table_name(schema, name))),
        other => Err(OmniqlError::NotSupported(format!(
            "SQLite cannot truncate a {}",
            other.keyword().to_lowercase()
        ))),
    }
}

pub(crate) fn duplicate_table_sql(table: &str, schema: Option<&str>, new_name: &str) -> String {
    format!(
        "CREATE TABLE {} AS SELECT * FROM {};",
        table_name(schema, new_name),
        table_name(schema, table)
    )
}
