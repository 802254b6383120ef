//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a resolved entity.

use crate::config::{FieldType, ResolvedEntity};
use crate::store::{ListQuery, Row, Window};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its placeholder, cast to the column type when known.
    fn placeholder(&mut self, entity: &ResolvedEntity, column: &str, v: Value) -> String {
        let ty = entity.column_type(column);
        // json columns take the serialized document as text so scalars cast cleanly
        let v = match (ty, v) {
            (Some(FieldType::Json), v) if !v.is_null() => Value::String(v.to_string()),
            (_, v) => v,
        };
        self.params.push(v);
        let n = self.params.len();
        match ty {
            Some(t) => format!("${}::{}", n, t.pg_type()),
            None => format!("${}", n),
        }
    }
}

fn select_column_list(entity: &ResolvedEntity) -> String {
    entity
        .columns()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// WHERE clause for the query's filters; filters on unknown columns are skipped.
fn where_clause(q: &mut QueryBuf, entity: &ResolvedEntity, leading: Vec<String>, query: &ListQuery) -> String {
    let mut parts = leading;
    for (col, val) in &query.filters {
        if !entity.has_column(col) {
            continue;
        }
        let ph = q.placeholder(entity, col, val.clone());
        parts.push(format!("{} = {}", quoted(col), ph));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT by primary key plus the query's filters.
pub fn select_by_id(entity: &ResolvedEntity, id: &Value, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_column;
    let id_ph = q.placeholder(entity, pk, id.clone());
    let where_sql = where_clause(&mut q, entity, vec![format!("{} = {}", quoted(pk), id_ph)], query);
    q.sql = format!(
        "SELECT {} FROM {}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_sql
    );
    q
}

/// SELECT COUNT(*) with the query's filters.
pub fn count(entity: &ResolvedEntity, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, Vec::new(), query);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(entity), where_sql);
    q
}

/// SELECT list with filters, ORDER BY the query's order (default: pk), optional LIMIT/OFFSET.
pub fn select_list(entity: &ResolvedEntity, query: &ListQuery, window: Option<Window>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, Vec::new(), query);
    let order_clause = match &query.order {
        Some(o) if entity.has_column(&o.column) => format!(
            " ORDER BY {} {}, {}",
            quoted(&o.column),
            if o.descending { "DESC" } else { "ASC" },
            quoted(&entity.pk_column)
        ),
        _ => format!(" ORDER BY {}", quoted(&entity.pk_column)),
    };
    let window_clause = window
        .map(|w| format!(" LIMIT {} OFFSET {}", w.limit, w.offset))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(entity),
        qualified_table(entity),
        where_sql,
        order_clause,
        window_clause
    );
    q
}

/// INSERT the given values; omitted columns take their database default.
pub fn insert(entity: &ResolvedEntity, values: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in entity.columns() {
        let Some(val) = values.get(&c.name) else { continue };
        let ph = q.placeholder(entity, &c.name, val.clone());
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only known, non-key columns present in values.
/// With nothing to set this degrades to a SELECT by id.
pub fn update(entity: &ResolvedEntity, id: &Value, values: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_column;
    let mut sets = Vec::new();
    for (k, v) in values {
        if k == pk || !entity.has_column(k) {
            continue;
        }
        let ph = q.placeholder(entity, k, v.clone());
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    if sets.is_empty() {
        return select_by_id(entity, id, &ListQuery::new());
    }
    let id_ph = q.placeholder(entity, pk, id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(pk),
        id_ph,
        select_column_list(entity)
    );
    q
}

/// DELETE by id.
pub fn delete(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = q.placeholder(entity, &entity.pk_column, id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        quoted(&entity.pk_column),
        id_ph,
        select_column_list(entity)
    );
    q
}
