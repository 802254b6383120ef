//! Config validation: unique names, primary keys, types, and relation integrity.

use crate::config::resolved::FieldType;
use crate::config::{EntityConfig, FullConfig, RelationKindConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Default database schema when entities omit `schema`.
pub fn default_schema_name(config: &FullConfig) -> &str {
    config.default_schema.as_deref().unwrap_or("public")
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let by_name: HashMap<&str, &EntityConfig> = config.entities.iter().map(|e| (e.name.as_str(), e)).collect();
    if by_name.len() != config.entities.len() {
        let mut seen = HashSet::new();
        for e in &config.entities {
            if !seen.insert(e.name.as_str()) {
                return Err(ConfigError::DuplicateEntity(e.name.clone()));
            }
        }
    }

    let mut path_segments = HashSet::new();
    for e in &config.entities {
        if !path_segments.insert(e.path.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(e.path.clone()));
        }
        validate_entity(e, &by_name)?;
    }
    Ok(())
}

fn validate_entity(entity: &EntityConfig, by_name: &HashMap<&str, &EntityConfig>) -> Result<(), ConfigError> {
    let mut field_names = HashSet::new();
    for f in &entity.fields {
        if !field_names.insert(f.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "entity {} declares field {} twice",
                entity.name, f.name
            )));
        }
    }

    let pks: Vec<_> = entity.fields.iter().filter(|f| f.primary_key).collect();
    if pks.len() != 1 {
        return Err(ConfigError::InvalidPrimaryKey {
            entity: entity.name.clone(),
            reason: format!("expected exactly one primary key field, found {}", pks.len()),
        });
    }
    if pks[0].relation.is_some() {
        return Err(ConfigError::InvalidPrimaryKey {
            entity: entity.name.clone(),
            reason: format!("primary key {} cannot be a relation", pks[0].name),
        });
    }

    for f in &entity.fields {
        let is_many = matches!(&f.relation, Some(r) if r.kind == RelationKindConfig::Many);
        match (&f.type_, is_many) {
            (Some(t), false) => {
                if FieldType::parse(t).is_none() {
                    return Err(ConfigError::UnknownFieldType {
                        entity: entity.name.clone(),
                        field: f.name.clone(),
                        type_name: t.clone(),
                    });
                }
            }
            (None, false) => {
                return Err(ConfigError::Validation(format!(
                    "field {}.{} needs a type",
                    entity.name, f.name
                )));
            }
            (Some(_), true) => {
                return Err(ConfigError::InvalidRelation(format!(
                    "to-many field {}.{} is not stored and cannot declare a type",
                    entity.name, f.name
                )));
            }
            (None, true) => {}
        }

        let Some(rel) = &f.relation else { continue };
        let target = by_name.get(rel.entity.as_str()).ok_or_else(|| ConfigError::MissingReference {
            kind: "entity",
            id: rel.entity.clone(),
        })?;
        if rel.kind == RelationKindConfig::Many {
            let via = rel.via.as_deref().ok_or_else(|| {
                ConfigError::InvalidRelation(format!("to-many field {}.{} needs `via`", entity.name, f.name))
            })?;
            let back = target.fields.iter().find(|tf| tf.name == via).ok_or_else(|| {
                ConfigError::InvalidRelation(format!("{}.{} does not exist", target.name, via))
            })?;
            let points_back = matches!(
                &back.relation,
                Some(r) if r.kind == RelationKindConfig::One && r.entity == entity.name
            );
            if !points_back {
                return Err(ConfigError::InvalidRelation(format!(
                    "{}.{} must be a to-one relation to {}",
                    target.name, via, entity.name
                )));
            }
        }
    }
    Ok(())
}
