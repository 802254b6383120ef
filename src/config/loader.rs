//! Load entity declarations from disk and resolve them into the runtime model.

use crate::config::resolved::{
    DefaultValue, DeletePolicy, FieldInfo, FieldType, RelationInfo, RelationKind, ResolvedEntity, ResolvedModel,
    CREATED_AT, DELETED, DELETED_AT, UPDATED_AT,
};
use crate::config::types::*;
use crate::config::{default_schema_name, validate};
use crate::error::ConfigError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// File holding the entity declarations inside a config directory.
pub const ENTITIES_FILE: &str = "entities.json";

/// Read `entities.json` from a config directory.
pub async fn load_from_path(dir: impl AsRef<Path>, default_schema: Option<String>) -> Result<FullConfig, ConfigError> {
    let path = dir.as_ref().join(ENTITIES_FILE);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let entities: Vec<EntityConfig> =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), entities = entities.len(), "loaded entity config");
    Ok(FullConfig {
        entities,
        default_schema,
    })
}

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_schema = default_schema_name(config);

    let mut entities = Vec::new();
    let mut entity_by_name = HashMap::new();
    let mut entity_by_path = HashMap::new();

    for e in &config.entities {
        let entity = Arc::new(resolve_entity(e, default_schema)?);
        entity_by_name.insert(entity.name.clone(), entity.clone());
        entity_by_path.insert(entity.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_name,
        entity_by_path,
    })
}

fn resolve_entity(e: &EntityConfig, default_schema: &str) -> Result<ResolvedEntity, ConfigError> {
    let mut fields = Vec::with_capacity(e.fields.len() + 4);
    for f in &e.fields {
        let ty = match &f.type_ {
            Some(t) => Some(FieldType::parse(t).ok_or_else(|| ConfigError::UnknownFieldType {
                entity: e.name.clone(),
                field: f.name.clone(),
                type_name: t.clone(),
            })?),
            None => None,
        };
        let mut default = f.default.as_ref().map(|d| match d {
            DefaultConfig::Literal(v) => DefaultValue::Literal(v.clone()),
            DefaultConfig::Expression { expression } => DefaultValue::from_expression(expression),
        });
        if f.primary_key && default.is_none() {
            default = match ty {
                Some(t) if t.is_integer() => Some(DefaultValue::Identity),
                Some(FieldType::Uuid) => Some(DefaultValue::RandomUuid),
                _ => None,
            };
        }
        let relation = f.relation.as_ref().map(|r| RelationInfo {
            target: r.entity.clone(),
            kind: match r.kind {
                RelationKindConfig::One => RelationKind::One,
                RelationKindConfig::Many => RelationKind::Many,
            },
            via: r.via.clone(),
        });
        fields.push(FieldInfo {
            name: f.name.clone(),
            ty,
            primary_key: f.primary_key,
            nullable: f.nullable && !f.primary_key,
            default,
            relation,
            validation: f.validation.clone(),
        });
    }

    let declared: HashSet<String> = fields.iter().map(|f| f.name.clone()).collect();
    let mut bookkeeping = vec![
        (CREATED_AT, FieldType::Timestamp, false, Some(DefaultValue::Now)),
        (UPDATED_AT, FieldType::Timestamp, false, Some(DefaultValue::Now)),
    ];
    if e.soft_delete {
        bookkeeping.push((DELETED, FieldType::Bool, false, Some(DefaultValue::Literal(Value::Bool(false)))));
        bookkeeping.push((DELETED_AT, FieldType::Timestamp, true, None));
    }
    for (name, ty, nullable, default) in bookkeeping {
        if !declared.contains(name) {
            fields.push(FieldInfo {
                name: name.to_string(),
                ty: Some(ty),
                primary_key: false,
                nullable,
                default,
                relation: None,
                validation: ValidationRule::default(),
            });
        }
    }

    let pk = fields
        .iter()
        .find(|f| f.primary_key)
        .ok_or_else(|| ConfigError::InvalidPrimaryKey {
            entity: e.name.clone(),
            reason: "no primary key".into(),
        })?;
    let pk_column = pk.name.clone();
    let pk_type = pk.ty.ok_or_else(|| ConfigError::InvalidPrimaryKey {
        entity: e.name.clone(),
        reason: "primary key needs a type".into(),
    })?;

    Ok(ResolvedEntity {
        name: e.name.clone(),
        schema_name: e.schema.clone().unwrap_or_else(|| default_schema.to_string()),
        table_name: e.table.clone(),
        path_segment: e.path.clone(),
        pk_column,
        pk_type,
        fields,
        delete_policy: if e.soft_delete { DeletePolicy::Soft } else { DeletePolicy::Hard },
    })
}
