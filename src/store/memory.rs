//! In-process store. Each session holds the store lock and works on a copy of the tables,
//! so sessions are serialized and an uncommitted session leaves no trace.

use super::{compare_values, now_timestamp, value_eq, ListQuery, Row, Session, Store, Window};
use crate::config::{DefaultValue, ResolvedEntity};
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Table {
    rows: Vec<Row>,
    last_id: i64,
}

type Tables = HashMap<String, Table>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Session>, AppError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { guard, working }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

struct MemorySession {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn table_key(entity: &ResolvedEntity) -> String {
    format!("{}.{}", entity.schema_name, entity.table_name)
}

fn matches(row: &Row, query: &ListQuery) -> bool {
    query
        .filters
        .iter()
        .all(|(col, val)| value_eq(row.get(col).unwrap_or(&Value::Null), val))
}

fn has_key(entity: &ResolvedEntity, row: &Row, id: &Value) -> bool {
    row.get(&entity.pk_column).map(|v| value_eq(v, id)).unwrap_or(false)
}

impl MemorySession {
    fn table(&mut self, entity: &ResolvedEntity) -> &mut Table {
        self.working.entry(table_key(entity)).or_default()
    }

    fn select(&mut self, entity: &ResolvedEntity, query: &ListQuery) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .table(entity)
            .rows
            .iter()
            .filter(|r| matches(r, query))
            .cloned()
            .collect();
        let order = query.order.clone();
        let pk = entity.pk_column.clone();
        rows.sort_by(|a, b| {
            let (col, desc) = match &order {
                Some(o) => (o.column.as_str(), o.descending),
                None => (pk.as_str(), false),
            };
            let ord = compare_values(a.get(col).unwrap_or(&Value::Null), b.get(col).unwrap_or(&Value::Null));
            let ord = if desc { ord.reverse() } else { ord };
            ord.then_with(|| compare_values(a.get(&pk).unwrap_or(&Value::Null), b.get(&pk).unwrap_or(&Value::Null)))
        });
        rows
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn fetch_one(&mut self, entity: &ResolvedEntity, id: &Value, query: &ListQuery) -> Result<Option<Row>, AppError> {
        Ok(self
            .table(entity)
            .rows
            .iter()
            .find(|r| has_key(entity, r, id) && matches(r, query))
            .cloned())
    }

    async fn count(&mut self, entity: &ResolvedEntity, query: &ListQuery) -> Result<u64, AppError> {
        Ok(self.table(entity).rows.iter().filter(|r| matches(r, query)).count() as u64)
    }

    async fn fetch_many(
        &mut self,
        entity: &ResolvedEntity,
        query: &ListQuery,
        window: Option<Window>,
    ) -> Result<Vec<Row>, AppError> {
        let rows = self.select(entity, query);
        Ok(match window {
            Some(w) => rows
                .into_iter()
                .skip(w.offset as usize)
                .take(w.limit as usize)
                .collect(),
            None => rows,
        })
    }

    async fn insert(&mut self, entity: &ResolvedEntity, values: &Row) -> Result<Row, AppError> {
        let table = self.table(entity);
        let mut row = Row::new();
        for field in entity.columns() {
            let value = match values.get(&field.name) {
                Some(v) => v.clone(),
                None => match &field.default {
                    Some(DefaultValue::Literal(v)) => v.clone(),
                    Some(DefaultValue::Now) => now_timestamp(),
                    Some(DefaultValue::Identity) => Value::Number((table.last_id + 1).into()),
                    Some(DefaultValue::RandomUuid) => Value::String(uuid::Uuid::new_v4().to_string()),
                    Some(DefaultValue::Expression(expr)) => {
                        tracing::warn!(field = %field.name, %expr, "memory store cannot evaluate default expression");
                        Value::Null
                    }
                    None => Value::Null,
                },
            };
            if field.primary_key && field.ty.map(|t| t.is_integer()).unwrap_or(false) {
                if let Some(n) = value.as_i64() {
                    table.last_id = table.last_id.max(n);
                }
            }
            if value.is_null() && !field.nullable {
                return Err(AppError::Validation(format!("{} may not be null", field.name)));
            }
            row.insert(field.name.clone(), value);
        }

        let id = row.get(&entity.pk_column).cloned().unwrap_or(Value::Null);
        if table.rows.iter().any(|r| has_key(entity, r, &id)) {
            return Err(AppError::Conflict(format!("{} {} already exists", entity.name, id)));
        }
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&mut self, entity: &ResolvedEntity, id: &Value, values: &Row) -> Result<Option<Row>, AppError> {
        let pk = entity.pk_column.clone();
        let table = self.table(entity);
        let Some(row) = table.rows.iter_mut().find(|r| has_key(entity, r, id)) else {
            return Ok(None);
        };
        for (k, v) in values {
            if *k == pk || !entity.has_column(k) {
                continue;
            }
            row.insert(k.clone(), v.clone());
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, entity: &ResolvedEntity, id: &Value) -> Result<Option<Row>, AppError> {
        let table = self.table(entity);
        let pos = table.rows.iter().position(|r| has_key(entity, r, id));
        Ok(pos.map(|i| table.rows.remove(i)))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemorySession { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
