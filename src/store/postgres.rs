//! PostgreSQL store: one transaction per session, rolled back when dropped uncommitted.

use super::{ListQuery, Row, Session, Store, Window};
use crate::config::{FieldType, ResolvedEntity};
use crate::error::AppError;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{ConnectOptions, PgConnection, PgPool, Postgres, Transaction};
use std::str::FromStr;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn Session>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    async fn fetch_optional(&mut self, entity: &ResolvedEntity, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        let row = bind_all(q).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(|r| row_to_json(entity, &r)))
    }
}

fn bind_all(q: &QueryBuf) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

#[async_trait]
impl Session for PgSession {
    async fn fetch_one(&mut self, entity: &ResolvedEntity, id: &Value, query: &ListQuery) -> Result<Option<Row>, AppError> {
        let q = sql::select_by_id(entity, id, query);
        self.fetch_optional(entity, &q).await
    }

    async fn count(&mut self, entity: &ResolvedEntity, query: &ListQuery) -> Result<u64, AppError> {
        let q = sql::count(entity, query);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut scalar = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            scalar = scalar.bind(PgBindValue::from_json(p));
        }
        let n = scalar.fetch_one(&mut *self.tx).await?;
        Ok(n.max(0) as u64)
    }

    async fn fetch_many(
        &mut self,
        entity: &ResolvedEntity,
        query: &ListQuery,
        window: Option<Window>,
    ) -> Result<Vec<Row>, AppError> {
        let q = sql::select_list(entity, query, window);
        let rows = bind_all(&q).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(|r| row_to_json(entity, r)).collect())
    }

    async fn insert(&mut self, entity: &ResolvedEntity, values: &Row) -> Result<Row, AppError> {
        let q = sql::insert(entity, values);
        self.fetch_optional(entity, &q)
            .await
            .map_err(conflict_on_unique)?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(&mut self, entity: &ResolvedEntity, id: &Value, values: &Row) -> Result<Option<Row>, AppError> {
        let q = sql::update(entity, id, values);
        self.fetch_optional(entity, &q).await.map_err(conflict_on_unique)
    }

    async fn delete(&mut self, entity: &ResolvedEntity, id: &Value) -> Result<Option<Row>, AppError> {
        let q = sql::delete(entity, id);
        self.fetch_optional(entity, &q).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Unique violations (SQLSTATE 23505) surface as 409 instead of 500.
fn conflict_on_unique(err: AppError) -> AppError {
    match err {
        AppError::Db(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
            AppError::Conflict(db.message().to_string())
        }
        other => other,
    }
}

fn row_to_json(entity: &ResolvedEntity, row: &PgRow) -> Row {
    let mut map = Row::new();
    for col in entity.columns() {
        let v = match col.ty {
            Some(ty) => cell_to_value(row, &col.name, ty),
            None => Value::Null,
        };
        map.insert(col.name.clone(), v);
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str, ty: FieldType) -> Value {
    use sqlx::Row as _;
    let decoded = match ty {
        FieldType::Int => row.try_get::<Option<i32>, _>(name).map(|v| v.map(Value::from)),
        FieldType::BigInt => row.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::from)),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)
            .map(|v| v.and_then(serde_json::Number::from_f64).map(Value::Number)),
        FieldType::Bool => row.try_get::<Option<bool>, _>(name).map(|v| v.map(Value::Bool)),
        FieldType::Text => row.try_get::<Option<String>, _>(name).map(|v| v.map(Value::String)),
        FieldType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| v.map(|u| Value::String(u.to_string()))),
        FieldType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .map(|v| v.map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Micros, true)))),
        FieldType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))),
        FieldType::Json => row.try_get::<Option<Value>, _>(name),
    };
    match decoded {
        Ok(v) => v.unwrap_or(Value::Null),
        Err(e) => {
            tracing::warn!(column = %name, error = %e, "could not decode column");
            Value::Null
        }
    }
}

/// Create the target database when it does not exist (connects to the `postgres` admin database).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}
