//! SQLite repository generic over a declared table shape

use super::{EntityKind, EntityRepository, FieldMap, Filter, Record, RowId, StoreError, StoreResult};
use crate::transaction::TransactionHandle;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn default_id_column() -> String {
    "id".to_string()
}

/// Shape of one table as far as the engine cares: its id column and every
/// other column that gets copied, filtered or updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub kind: EntityKind,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new(kind: impl Into<EntityKind>, columns: &[&str]) -> StoreResult<Self> {
        let schema = Self {
            kind: kind.into(),
            id_column: default_id_column(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn with_id_column(mut self, id_column: impl Into<String>) -> StoreResult<Self> {
        self.id_column = id_column.into();
        self.validate()?;
        Ok(self)
    }

    /// Table, id and column names are interpolated into SQL, so they must be plain identifiers
    pub fn validate(&self) -> StoreResult<()> {
        let names = std::iter::once(self.kind.as_str())
            .chain(std::iter::once(self.id_column.as_str()))
            .chain(self.columns.iter().map(String::as_str));
        for name in names {
            if !IDENTIFIER.is_match(name) {
                return Err(StoreError::InvalidIdentifier(name.to_string()));
            }
        }
        if self.columns.iter().any(|c| c == &self.id_column) {
            return Err(StoreError::InvalidIdentifier(format!(
                "{}.{} is the id column and cannot be listed as a data column",
                self.kind, self.id_column
            )));
        }
        Ok(())
    }

    pub fn table(&self) -> &str {
        self.kind.as_str()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn check_column(&self, column: &str) -> StoreResult<()> {
        if column == self.id_column || self.has_column(column) {
            Ok(())
        } else {
            Err(StoreError::UnknownColumn {
                kind: self.kind.clone(),
                column: column.to_string(),
            })
        }
    }

    /// `SELECT id, json_object(...)` so rows decode without compile-time types
    fn select_sql(&self) -> String {
        let pairs: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("'{}', {}", column, column))
            .collect();
        format!(
            "SELECT {} AS id, json_object({}) AS fields FROM {}",
            self.id_column,
            pairs.join(", "),
            self.table()
        )
    }
}

/// [`EntityRepository`] over any table described by a [`TableSchema`]
#[derive(Debug, Clone)]
pub struct TableRepository {
    schema: TableSchema,
}

impl TableRepository {
    pub fn new(schema: TableSchema) -> StoreResult<Self> {
        schema.validate()?;
        Ok(Self { schema })
    }

    fn check_filter(&self, filter: &Filter) -> StoreResult<()> {
        filter
            .columns()
            .into_iter()
            .try_for_each(|column| self.schema.check_column(column))
    }

    fn check_fields(&self, fields: &FieldMap) -> StoreResult<()> {
        for column in fields.keys() {
            if !self.schema.has_column(column) {
                return Err(StoreError::UnknownColumn {
                    kind: self.schema.kind.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    fn where_clause(&self, filter: &Filter) -> StoreResult<(String, Vec<Value>)> {
        self.check_filter(filter)?;
        let mut sql = String::from(" WHERE ");
        let mut binds = Vec::new();
        filter.render(&self.schema.id_column, &mut sql, &mut binds);
        Ok((sql, binds))
    }
}

#[async_trait]
impl EntityRepository for TableRepository {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn find_all(&self, tx: &mut TransactionHandle, filter: &Filter) -> StoreResult<Vec<Record>> {
        let (clause, binds) = self.where_clause(filter)?;
        let sql = format!("{}{} ORDER BY {}", self.schema.select_sql(), clause, self.schema.id_column);
        log::debug!("[{}] {}", tx.id(), sql);

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(tx.connection())
            .await?;

        rows.iter().map(decode_record).collect()
    }

    async fn find_by_id(&self, tx: &mut TransactionHandle, id: RowId) -> StoreResult<Option<Record>> {
        let sql = format!("{} WHERE {} = ?", self.schema.select_sql(), self.schema.id_column);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(tx.connection())
            .await?;

        row.as_ref().map(decode_record).transpose()
    }

    async fn bulk_create(&self, tx: &mut TransactionHandle, rows: Vec<FieldMap>) -> StoreResult<Vec<Record>> {
        let mut created = Vec::with_capacity(rows.len());

        // One statement per row: RETURNING order across a multi-row insert is unspecified
        for fields in rows {
            self.check_fields(&fields)?;

            let sql = if fields.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", self.schema.table(), self.schema.id_column)
            } else {
                let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
                let placeholders = vec!["?"; columns.len()].join(", ");
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                    self.schema.table(),
                    columns.join(", "),
                    placeholders,
                    self.schema.id_column
                )
            };

            let values: Vec<Value> = fields.values().cloned().collect();
            let id: RowId = bind_all(sqlx::query(&sql), &values)
                .fetch_one(tx.connection())
                .await?
                .try_get(0)?;

            created.push(Record { id, fields });
        }

        log::debug!("[{}] Inserted {} {} rows", tx.id(), created.len(), self.schema.kind);
        Ok(created)
    }

    async fn update(&self, tx: &mut TransactionHandle, record: &Record) -> StoreResult<()> {
        self.check_fields(&record.fields)?;
        if record.fields.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = record
            .fields
            .keys()
            .map(|column| format!("{} = ?", column))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.schema.table(),
            assignments.join(", "),
            self.schema.id_column
        );

        let values: Vec<Value> = record.fields.values().cloned().collect();
        let result = bind_all(sqlx::query(&sql), &values)
            .bind(record.id)
            .execute(tx.connection())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                kind: self.schema.kind.clone(),
                id: record.id,
            });
        }

        Ok(())
    }

    async fn destroy(&self, tx: &mut TransactionHandle, filter: &Filter) -> StoreResult<u64> {
        let (clause, binds) = self.where_clause(filter)?;
        let sql = format!("DELETE FROM {}{}", self.schema.table(), clause);
        log::debug!("[{}] {}", tx.id(), sql);

        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(tx.connection())
            .await?;

        Ok(result.rows_affected())
    }
}

fn decode_record(row: &SqliteRow) -> StoreResult<Record> {
    let id: RowId = row.try_get("id")?;
    let raw: String = row.try_get("fields")?;
    let fields: FieldMap = serde_json::from_str(&raw)?;
    Ok(Record { id, fields })
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, values: &[Value]) -> SqliteQuery<'q> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<i64>),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64()),
        },
        Value::String(text) => query.bind(text.clone()),
        // Nested JSON is stored as text
        other => query.bind(other.to_string()),
    }
}
