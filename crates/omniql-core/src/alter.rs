//! DDL alteration specs for tables, indexes, relations and partitions

use crate::{ForeignKeyAction, IndexColumn};
use serde::{Deserialize, Serialize};

/// New column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(expr.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "value", rename_all = "snake_case")]
pub enum ColumnChange {
    Rename(String),
    DataType(String),
    Nullable(bool),
    /// `None` drops the default
    DefaultValue(Option<String>),
    Comment(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlteration {
    pub column: String,
    pub change: ColumnChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterTableSpec {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub adds: Vec<ColumnDefinition>,
    #[serde(default)]
    pub alterations: Vec<ColumnAlteration>,
    #[serde(default)]
    pub drops: Vec<String>,
}

impl AlterTableSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn add(mut self, column: ColumnDefinition) -> Self {
        self.adds.push(column);
        self
    }

    pub fn alter(mut self, column: impl Into<String>, change: ColumnChange) -> Self {
        self.alterations.push(ColumnAlteration {
            column: column.into(),
            change,
        });
        self
    }

    pub fn drop_column(mut self, column: impl Into<String>) -> Self {
        self.drops.push(column.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.alterations.is_empty() && self.drops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAlterSpec {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub additions: Vec<IndexDefinition>,
    #[serde(default)]
    pub drops: Vec<String>,
}

impl IndexAlterSpec {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.drops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub from_column: String,
    #[serde(default)]
    pub to_schema: Option<String>,
    pub to_table: String,
    pub to_column: String,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationAlterSpec {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub additions: Vec<RelationDefinition>,
    #[serde(default)]
    pub drops: Vec<String>,
}

impl RelationAlterSpec {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.drops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDefinition {
    pub name: String,
    /// Bound expression, e.g. `FOR VALUES FROM (1) TO (10)`
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAlterSpec {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub attach: Vec<PartitionDefinition>,
    #[serde(default)]
    pub detach: Vec<String>,
}

impl PartitionAlterSpec {
    pub fn is_empty(&self) -> bool {
        self.attach.is_empty() && self.detach.is_empty()
    }
}
