//! Apply DDL from the resolved model: schemas, tables, then foreign keys for to-one relations.

use crate::config::{DefaultValue, FieldInfo, RelationKind, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::sql::{qualified_table, quoted};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeSet;

/// Create missing schemas and tables. Existing tables are left as they are.
pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), AppError> {
    let schemas: BTreeSet<&str> = model.entities.iter().map(|e| e.schema_name.as_str()).collect();
    for schema in schemas {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema));
        sqlx::query(&sql).execute(pool).await?;
    }

    for entity in &model.entities {
        let sql = create_table_sql(entity);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
    }

    for entity in &model.entities {
        for sql in foreign_key_sql(entity, model) {
            // the constraint may already exist from an earlier run
            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                tracing::debug!(error = %e, sql = %sql, "foreign key skipped");
            }
        }
    }
    tracing::info!(entities = model.entities.len(), "migrations applied");
    Ok(())
}

pub fn create_table_sql(entity: &ResolvedEntity) -> String {
    let mut col_defs: Vec<String> = entity.columns().map(column_def).collect();
    col_defs.push(format!("PRIMARY KEY ({})", quoted(&entity.pk_column)));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(entity),
        col_defs.join(",\n  ")
    )
}

fn column_def(c: &FieldInfo) -> String {
    let typ = c.ty.map(|t| t.pg_type()).unwrap_or("text");
    let mut def = format!("{} {}", quoted(&c.name), typ);
    if matches!(c.default, Some(DefaultValue::Identity)) {
        def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
    }
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = c.default.as_ref().and_then(default_sql) {
        def.push_str(" DEFAULT ");
        def.push_str(&d);
    }
    def
}

fn default_sql(d: &DefaultValue) -> Option<String> {
    match d {
        DefaultValue::Literal(v) => literal_sql(v),
        DefaultValue::Now => Some("NOW()".into()),
        DefaultValue::Identity => None,
        DefaultValue::RandomUuid => Some("gen_random_uuid()".into()),
        DefaultValue::Expression(expr) => Some(expr.clone()),
    }
}

fn literal_sql(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.into()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Array(_) | Value::Object(_) => Some(format!("'{}'::jsonb", v.to_string().replace('\'', "''"))),
    }
}

pub fn foreign_key_sql(entity: &ResolvedEntity, model: &ResolvedModel) -> Vec<String> {
    entity
        .fields
        .iter()
        .filter_map(|f| {
            let rel = f.relation.as_ref().filter(|r| r.kind == RelationKind::One)?;
            let target = model.entity(&rel.target)?;
            let constraint = format!("fk_{}_{}", entity.table_name, f.name);
            Some(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                qualified_table(entity),
                quoted(&constraint),
                quoted(&f.name),
                qualified_table(target),
                quoted(&target.pk_column)
            ))
        })
        .collect()
}
