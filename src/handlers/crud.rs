//! Handlers behind the generated CRUD routes. Each opens one storage session, runs the
//! accessor through it and commits only when everything succeeded.

use crate::config::{FieldType, ResolvedEntity};
use crate::error::AppError;
use crate::pagination::{Pagination, LIMIT_PARAM, OFFSET_PARAM};
use crate::response::Page;
use crate::routes::crud::{CrudResource, ResourceState};
use crate::schema::render;
use crate::service::WriteOptions;
use crate::store::{Row, Session};
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

/// Parse a path id by the primary key type.
pub fn parse_id(raw: &str, pk_type: FieldType) -> Result<Value, AppError> {
    let invalid = || AppError::Validation(format!("invalid id '{}'", raw));
    Ok(match pk_type {
        FieldType::Int => {
            let n: i32 = raw.parse().map_err(|_| invalid())?;
            Value::from(n)
        }
        FieldType::BigInt => {
            let n: i64 = raw.parse().map_err(|_| invalid())?;
            Value::from(n)
        }
        FieldType::Uuid => {
            let u = uuid::Uuid::parse_str(raw).map_err(|_| invalid())?;
            Value::String(u.to_string())
        }
        _ => Value::String(raw.to_string()),
    })
}

/// Typed value for an exact-match filter given as a query parameter.
/// Bookkeeping columns are never taken from the query string; `get_all` skips them.
pub fn query_value_for_column(entity: &ResolvedEntity, col: &str, s: &str) -> Result<Value, AppError> {
    let invalid = || AppError::Validation(format!("invalid value for filter '{}'", col));
    Ok(match entity.column_type(col) {
        Some(FieldType::Int) => Value::from(s.parse::<i32>().map_err(|_| invalid())?),
        Some(FieldType::BigInt) => Value::from(s.parse::<i64>().map_err(|_| invalid())?),
        Some(FieldType::Float) => {
            let f: f64 = s.parse().map_err(|_| invalid())?;
            serde_json::Number::from_f64(f).map(Value::Number).ok_or_else(invalid)?
        }
        Some(FieldType::Bool) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        Some(FieldType::Uuid) => Value::String(uuid::Uuid::parse_str(s).map_err(|_| invalid())?.to_string()),
        _ => Value::String(s.to_string()),
    })
}

async fn shape(resource: &CrudResource, session: &mut dyn Session, row: Row) -> Result<Value, AppError> {
    match &resource.response_schema {
        Some(schema) => render(session, schema, &row).await,
        None => Ok(Value::Object(row)),
    }
}

pub async fn get_all(
    State(state): State<ResourceState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<Value>>, AppError> {
    let service = &state.resource.service;
    let pagination = Pagination::from_request(&uri, &headers, &params, state.max_limit)?;
    let mut filters = Vec::new();
    for (k, v) in &params {
        if k == LIMIT_PARAM
            || k == OFFSET_PARAM
            || ResolvedEntity::is_bookkeeping(k)
            || !service.entity().has_column(k)
        {
            continue;
        }
        filters.push((k.clone(), query_value_for_column(service.entity(), k, v)?));
    }
    let query = service.order_for_listing(service.query_with(filters));

    let mut session = state.store.begin().await?;
    let page = pagination.paginate(&mut *session, service, &query).await?;
    let mut data = Vec::with_capacity(page.data.len());
    for row in page.data.iter().cloned() {
        data.push(shape(&state.resource, &mut *session, row).await?);
    }
    session.commit().await?;
    Ok(Json(page.with_data(data)))
}

pub async fn get_one(State(state): State<ResourceState>, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let service = &state.resource.service;
    let id = parse_id(&id, service.entity().pk_type)?;
    let mut session = state.store.begin().await?;
    let row = service.get(&mut *session, &id).await?;
    let out = shape(&state.resource, &mut *session, row).await?;
    session.commit().await?;
    Ok(Json(out))
}

pub async fn post_one(
    State(state): State<ResourceState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = &state.resource.service;
    let data = state.resource.create_schema.validate_full(&body)?;
    let mut session = state.store.begin().await?;
    let row = service.create(&mut *session, data, &WriteOptions::default()).await?;
    let out = shape(&state.resource, &mut *session, row).await?;
    session.commit().await?;
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn put_one(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let service = &state.resource.service;
    let id = parse_id(&id, service.entity().pk_type)?;
    let data = state.resource.update_schema.validate_partial(&body)?;
    let mut session = state.store.begin().await?;
    let row = service.update_by_id(&mut *session, &id, data, &WriteOptions::default()).await?;
    let out = shape(&state.resource, &mut *session, row).await?;
    session.commit().await?;
    Ok(Json(out))
}

pub async fn delete_one(State(state): State<ResourceState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    let service = &state.resource.service;
    let id = parse_id(&id, service.entity().pk_type)?;
    let mut session = state.store.begin().await?;
    service.remove_by_id(&mut *session, &id).await?;
    session.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
