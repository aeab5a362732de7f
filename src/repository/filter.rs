//! Row predicates rendered to parameterized SQL

use super::RowId;
use serde_json::Value;

/// Closed set of predicates the engine needs from the store
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row
    All,
    /// `column = value` (`IS NULL` when value is null)
    Eq(String, Value),
    /// `column IN (...)`; an empty set matches nothing
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
    /// Primary key in set (the id column name comes from the table schema)
    IdIn(Vec<RowId>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn any_of<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn ids(ids: impl IntoIterator<Item = RowId>) -> Self {
        Filter::IdIn(ids.into_iter().collect())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Column names referenced by this filter (the id column is implicit)
    pub(crate) fn columns(&self) -> Vec<&str> {
        match self {
            Filter::All | Filter::IdIn(_) => Vec::new(),
            Filter::Eq(column, _)
            | Filter::In(column, _)
            | Filter::IsNull(column)
            | Filter::NotNull(column) => vec![column.as_str()],
            Filter::And(parts) => parts.iter().flat_map(Filter::columns).collect(),
        }
    }

    /// Append the SQL for this filter to `sql`, pushing bind values in placeholder order
    pub(crate) fn render(&self, id_column: &str, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Filter::All => sql.push_str("1 = 1"),
            Filter::Eq(column, Value::Null) | Filter::IsNull(column) => {
                sql.push_str(&format!("{} IS NULL", column));
            }
            Filter::Eq(column, value) => {
                sql.push_str(&format!("{} = ?", column));
                binds.push(value.clone());
            }
            Filter::NotNull(column) => sql.push_str(&format!("{} IS NOT NULL", column)),
            Filter::In(column, values) => render_in(column, values.iter().cloned(), sql, binds),
            Filter::IdIn(ids) => render_in(id_column, ids.iter().map(|id| Value::from(*id)), sql, binds),
            Filter::And(parts) => {
                if parts.is_empty() {
                    sql.push_str("1 = 1");
                    return;
                }
                sql.push('(');
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        sql.push_str(" AND ");
                    }
                    part.render(id_column, sql, binds);
                }
                sql.push(')');
            }
        }
    }
}

fn render_in(column: &str, values: impl Iterator<Item = Value>, sql: &mut String, binds: &mut Vec<Value>) {
    let before = binds.len();
    binds.extend(values);
    let count = binds.len() - before;
    if count == 0 {
        sql.push_str("1 = 0");
        return;
    }
    let placeholders = vec!["?"; count].join(", ");
    sql.push_str(&format!("{} IN ({})", column, placeholders));
}
