//! Storage sessions. A handler opens one `Session` per request, runs its accessor calls
//! through it and commits; dropping an uncommitted session discards its writes.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::config::ResolvedEntity;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// One stored record, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Exact-match filters plus ordering over one entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<(String, Value)>,
    pub order: Option<OrderBy>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter; replaces an existing filter on the same column.
    pub fn filter(mut self, column: impl Into<String>, value: Value) -> Self {
        let column = column.into();
        match self.filters.iter_mut().find(|(c, _)| *c == column) {
            Some(existing) => existing.1 = value,
            None => self.filters.push((column, value)),
        }
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            descending,
        });
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Session>, AppError>;

    /// Cheap liveness check for readiness probes.
    async fn ping(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait Session: Send {
    /// Row with primary key `id` that also matches `query`'s filters.
    async fn fetch_one(&mut self, entity: &ResolvedEntity, id: &Value, query: &ListQuery) -> Result<Option<Row>, AppError>;

    async fn count(&mut self, entity: &ResolvedEntity, query: &ListQuery) -> Result<u64, AppError>;

    async fn fetch_many(
        &mut self,
        entity: &ResolvedEntity,
        query: &ListQuery,
        window: Option<Window>,
    ) -> Result<Vec<Row>, AppError>;

    /// Insert `values`; columns left out take their defaults. Returns the stored row.
    async fn insert(&mut self, entity: &ResolvedEntity, values: &Row) -> Result<Row, AppError>;

    /// Overwrite the given columns of row `id`. None when the row does not exist.
    async fn update(&mut self, entity: &ResolvedEntity, id: &Value, values: &Row) -> Result<Option<Row>, AppError>;

    /// Delete row `id` outright. Returns the deleted row.
    async fn delete(&mut self, entity: &ResolvedEntity, id: &Value) -> Result<Option<Row>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// Current time in the format rows carry timestamps in.
pub fn now_timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Equality that treats 1 and 1.0 as the same number.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// Total order over JSON scalars used for in-memory sorting; nulls sort first.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(n), Value::Number(m)) => n
            .as_f64()
            .partial_cmp(&m.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(s), Value::String(t)) => s.cmp(t),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
