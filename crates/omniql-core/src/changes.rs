//! Structured change batches applied atomically by a client

use crate::Value;
use serde::{Deserialize, Serialize};

/// Primary key column and value identifying one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub column: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableChange {
    Insert {
        table: String,
        schema: Option<String>,
        /// One entry per row, each a list of column/value pairs
        rows: Vec<Vec<(String, Value)>>,
    },
    Update {
        table: String,
        schema: Option<String>,
        primary_keys: Vec<KeyValue>,
        column: String,
        value: Value,
    },
    Delete {
        table: String,
        schema: Option<String>,
        primary_keys: Vec<KeyValue>,
    },
}

impl TableChange {
    pub fn table(&self) -> &str {
        match self {
            TableChange::Insert { table, .. }
            | TableChange::Update { table, .. }
            | TableChange::Delete { table, .. } => table,
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match self {
            TableChange::Insert { schema, .. }
            | TableChange::Update { schema, .. }
            | TableChange::Delete { schema, .. } => schema.as_deref(),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            TableChange::Insert { .. } => ChangeKind::Insert,
            TableChange::Update { .. } => ChangeKind::Update,
            TableChange::Delete { .. } => ChangeKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Ordered batch of changes against one database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChanges {
    pub changes: Vec<TableChange>,
}

impl TableChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, table: impl Into<String>, row: Vec<(String, Value)>) -> Self {
        self.changes.push(TableChange::Insert {
            table: table.into(),
            schema: None,
            rows: vec![row],
        });
        self
    }

    pub fn update(
        mut self,
        table: impl Into<String>,
        primary_keys: Vec<KeyValue>,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.changes.push(TableChange::Update {
            table: table.into(),
            schema: None,
            primary_keys,
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(mut self, table: impl Into<String>, primary_keys: Vec<KeyValue>) -> Self {
        self.changes.push(TableChange::Delete {
            table: table.into(),
            schema: None,
            primary_keys,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Outcome of one applied change, in batch order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub kind: ChangeKind,
    pub table: String,
    pub affected_rows: u64,
}
