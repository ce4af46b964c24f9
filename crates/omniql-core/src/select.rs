//! Top-N select requests

use crate::{Value, dialect::qualified_name};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    IsNull,
    IsNotNull,
    In,
}

impl FilterOp {
    fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "<>",
            FilterOp::Lt => "<",
            FilterOp::LtEq => "<=",
            FilterOp::Gt => ">",
            FilterOp::GtEq => ">=",
            FilterOp::Like => "LIKE",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
            FilterOp::In => "IN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
    #[serde(default = "null_value")]
    pub value: Value,
}

fn null_value() -> Value {
    Value::Null
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectFilter {
    /// Raw SQL fragment placed after `WHERE` as-is
    Sql(String),
    /// Conditions joined with `AND`, values bound as parameters
    Conditions(Vec<FilterCondition>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectTopRequest {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub offset: u64,
    pub limit: u64,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub filter: Option<SelectFilter>,
}

impl SelectTopRequest {
    pub fn new(table: impl Into<String>, limit: u64) -> Self {
        Self {
            table: table.into(),
            schema: None,
            offset: 0,
            limit,
            order_by: Vec::new(),
            filter: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn filter(mut self, filter: SelectFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Renders `SELECT * FROM ... [WHERE ...] [ORDER BY ...] LIMIT n OFFSET m`.
    ///
    /// `placeholder` receives the 1-based parameter index and returns the
    /// engine's bind marker. Bound values are returned in order.
    pub fn to_sql(
        &self,
        wrap: impl Fn(&str) -> String,
        placeholder: impl Fn(usize) -> String,
    ) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT * FROM {}",
            qualified_name(&wrap, self.schema.as_deref(), &self.table)
        );

        let where_clause = match &self.filter {
            Some(SelectFilter::Sql(fragment)) if !fragment.trim().is_empty() => {
                Some(fragment.trim().to_string())
            }
            Some(SelectFilter::Conditions(conditions)) if !conditions.is_empty() => {
                let parts: Vec<String> = conditions
                    .iter()
                    .map(|c| render_condition(c, &wrap, &placeholder, &mut params))
                    .collect();
                Some(parts.join(" AND "))
            }
            _ => None,
        };
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !self.order_by.is_empty() {
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        wrap(&o.field),
                        if o.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        sql.push_str(&format!(" LIMIT {} OFFSET {}", self.limit, self.offset));
        (sql, params)
    }
}

fn render_condition(
    condition: &FilterCondition,
    wrap: &impl Fn(&str) -> String,
    placeholder: &impl Fn(usize) -> String,
    params: &mut Vec<Value>,
) -> String {
    let field = wrap(&condition.field);
    match condition.op {
        FilterOp::IsNull | FilterOp::IsNotNull => format!("{field} {}", condition.op.as_sql()),
        FilterOp::In => {
            let values = match &condition.value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            let markers: Vec<String> = values
                .into_iter()
                .map(|v| {
                    params.push(v);
                    placeholder(params.len())
                })
                .collect();
            format!("{field} IN ({})", markers.join(", "))
        }
        op => {
            params.push(condition.value.clone());
            format!("{field} {} {}", op.as_sql(), placeholder(params.len()))
        }
    }
}
