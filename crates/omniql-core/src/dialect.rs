//! Identifier quoting and literal rendering helpers for driver implementations
//!
//! Drivers pick the quoting style of their engine and use these helpers when
//! generating executable SQL. Generic code never quotes on its own; it always
//! goes through `DatabaseClient::wrap_identifier`.

use crate::Value;

/// Identifier quoting style of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierQuote {
    /// `"name"`, used by PostgreSQL, SQLite and most ANSI engines
    Double,
    /// `` `name` ``, used by MySQL and MariaDB
    Backtick,
    /// `[name]`, used by SQL Server
    Bracket,
}

impl IdentifierQuote {
    /// Quotes one identifier, doubling any embedded closing quote
    pub fn wrap(self, identifier: &str) -> String {
        match self {
            IdentifierQuote::Double => format!("\"{}\"", identifier.replace('"', "\"\"")),
            IdentifierQuote::Backtick => format!("`{}`", identifier.replace('`', "``")),
            IdentifierQuote::Bracket => format!("[{}]", identifier.replace(']', "]]")),
        }
    }
}

/// `schema.name` with both parts quoted through `wrap`
pub fn qualified_name(wrap: impl Fn(&str) -> String, schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) if !schema.is_empty() => format!("{}.{}", wrap(schema), wrap(name)),
        _ => wrap(name),
    }
}

/// Escapes a string as a single-quoted SQL literal
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders a value as an inline SQL literal.
/// Non-finite floats have no SQL literal and render as `NULL`.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) if !v.is_finite() => "NULL".to_string(),
        Value::Float(v) => v.to_string(),
        Value::Decimal(v) => v.clone(),
        Value::Bytes(v) => {
            let hex: String = v.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(value_literal).collect();
            format!("({})", inner.join(", "))
        }
        other => string_literal(&other.to_string()),
    }
}
