//! Request/response schemas derived from a resolved entity.
//!
//! A schema lists the fields a body may carry (type, required, nullable,
//! constraints). Relation fields are left out unless substituted with
//! [`SchemaBuilder::include`], either by a scalar key type or by a nested
//! schema of the related entity.

mod render;
mod validation;

pub use render::render;

use crate::config::{FieldType, RelationInfo, RelationKind, ResolvedEntity, ValidationRule};
use crate::error::{AppError, ConfigError};
use crate::store::Row;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum SchemaType {
    Scalar(FieldType),
    /// One related row, rendered with the given schema.
    Nested(Arc<Schema>),
    /// All related rows, rendered with the given schema.
    List(Arc<Schema>),
}

#[derive(Clone, Debug)]
pub struct SchemaField {
    pub name: String,
    pub ty: SchemaType,
    pub required: bool,
    pub nullable: bool,
    pub validation: ValidationRule,
    pub relation: Option<RelationInfo>,
}

#[derive(Clone, Debug)]
pub struct Schema {
    pub name: String,
    pub entity: Arc<ResolvedEntity>,
    /// Output schema built from stored rows rather than request bodies.
    pub orm: bool,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a create body: required fields must be present, unknown keys are dropped.
    pub fn validate_full(&self, body: &Value) -> Result<Row, AppError> {
        self.validate(body, false)
    }

    /// Validate an update body: only the supplied fields are checked.
    pub fn validate_partial(&self, body: &Value) -> Result<Row, AppError> {
        self.validate(body, true)
    }

    fn validate(&self, body: &Value, partial: bool) -> Result<Row, AppError> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::Validation("request body must be a JSON object".into()))?;
        let mut out = Row::new();
        for field in &self.fields {
            let value = obj.get(&field.name);
            let ty = match &field.ty {
                SchemaType::Scalar(ty) => *ty,
                SchemaType::Nested(_) | SchemaType::List(_) => {
                    if value.is_some() {
                        return Err(AppError::Validation(format!("{} cannot be set through this endpoint", field.name)));
                    }
                    continue;
                }
            };
            let v = match value {
                None if partial || !field.required => continue,
                None => return Err(AppError::Validation(format!("{} is required", field.name))),
                Some(Value::Null) if field.nullable => Value::Null,
                Some(Value::Null) => return Err(AppError::Validation(format!("{} may not be null", field.name))),
                Some(v) => validation::check_type(&field.name, ty, v.clone())?,
            };
            validation::validate_field(&field.name, &v, &field.validation)?;
            out.insert(field.name.clone(), v);
        }
        Ok(out)
    }
}

/// Builds a [`Schema`] from an entity's declared fields.
pub struct SchemaBuilder {
    entity: Arc<ResolvedEntity>,
    exclude: Vec<String>,
    include: Vec<(String, SchemaType)>,
    orm: bool,
    name: Option<String>,
}

impl SchemaBuilder {
    pub fn new(entity: Arc<ResolvedEntity>) -> Self {
        SchemaBuilder {
            entity,
            exclude: Vec::new(),
            include: Vec::new(),
            orm: true,
            name: None,
        }
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Substitute the type of `field`. Needed for relation fields, which are skipped otherwise.
    pub fn include(mut self, field: impl Into<String>, ty: SchemaType) -> Self {
        self.include.push((field.into(), ty));
        self
    }

    pub fn orm(mut self, orm: bool) -> Self {
        self.orm = orm;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `{Entity}{ORM}{_exclude_a_b}` unless a name was given.
    pub fn default_name(&self) -> String {
        let orm = if self.orm { "ORM" } else { "" };
        let exclude = if self.exclude.is_empty() {
            String::new()
        } else {
            format!("_exclude_{}", self.exclude.join("_"))
        };
        format!("{}{}{}", self.entity.name, orm, exclude)
    }

    pub fn build(self) -> Result<Arc<Schema>, ConfigError> {
        let entity = &self.entity;
        for (name, ty) in &self.include {
            let field = entity.field(name).ok_or_else(|| {
                ConfigError::Validation(format!("{} has no field '{}' to include", entity.name, name))
            })?;
            check_substitution(entity, field.relation.as_ref(), name, ty)?;
        }

        let mut fields = Vec::new();
        for f in &entity.fields {
            if self.exclude.iter().any(|e| *e == f.name) {
                continue;
            }
            let substituted = self.include.iter().find(|(n, _)| *n == f.name).map(|(_, t)| t.clone());
            let ty = match (substituted, f.relation.as_ref(), f.ty) {
                (Some(t), _, _) => t,
                (None, Some(_), _) => continue,
                (None, None, Some(t)) => SchemaType::Scalar(t),
                (None, None, None) => continue,
            };
            let required = f.validation.required == Some(true) || !(f.has_default() || f.nullable);
            fields.push(SchemaField {
                name: f.name.clone(),
                ty,
                required,
                nullable: f.nullable,
                validation: f.validation.clone(),
                relation: f.relation.clone(),
            });
        }

        let name = self.name.clone().unwrap_or_else(|| self.default_name());
        tracing::debug!(schema = %name, fields = fields.len(), "built schema");
        Ok(Arc::new(Schema {
            name,
            entity: self.entity,
            orm: self.orm,
            fields,
        }))
    }
}

fn check_substitution(
    entity: &ResolvedEntity,
    relation: Option<&RelationInfo>,
    name: &str,
    ty: &SchemaType,
) -> Result<(), ConfigError> {
    let mismatch = |what: &str| ConfigError::Validation(format!("{}.{}: {}", entity.name, name, what));
    match (ty, relation) {
        (SchemaType::Scalar(_), Some(r)) if r.kind == RelationKind::Many => Err(mismatch("to-many relation cannot be a scalar")),
        (SchemaType::Scalar(_), _) => Ok(()),
        (SchemaType::Nested(s), Some(r)) if r.kind == RelationKind::One && s.entity.name == r.target => Ok(()),
        (SchemaType::List(s), Some(r)) if r.kind == RelationKind::Many && s.entity.name == r.target => Ok(()),
        (SchemaType::Nested(_), _) => Err(mismatch("nested schema needs a to-one relation to the schema's entity")),
        (SchemaType::List(_), _) => Err(mismatch("list schema needs a to-many relation to the schema's entity")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        let config = FullConfig {
            entities: serde_json::from_str(
                r#"[
                  {"name": "User", "table": "user", "path": "user", "fields": [
                    {"name": "id", "type": "bigint", "primary_key": true},
                    {"name": "name", "type": "text", "nullable": false, "validation": {"max_length": 8}},
                    {"name": "todos", "relation": {"entity": "Todo", "kind": "many", "via": "user"}}
                  ]},
                  {"name": "Todo", "table": "todo", "path": "todo", "fields": [
                    {"name": "id", "type": "bigint", "primary_key": true},
                    {"name": "name", "type": "text", "nullable": false},
                    {"name": "done", "type": "bool", "nullable": false, "default": false},
                    {"name": "user", "type": "bigint", "relation": {"entity": "User", "kind": "one"}}
                  ]}
                ]"#,
            )
            .unwrap(),
            default_schema: None,
        };
        resolve(&config).unwrap()
    }

    #[test]
    fn names_are_derived_from_options() {
        let m = model();
        let todo = m.entity("Todo").unwrap().clone();
        assert_eq!(SchemaBuilder::new(todo.clone()).build().unwrap().name, "TodoORM");
        let create = SchemaBuilder::new(todo.clone()).exclude(["id"]).orm(false).build().unwrap();
        assert_eq!(create.name, "Todo_exclude_id");
        let custom = SchemaBuilder::new(todo).name("TodoOut").build().unwrap();
        assert_eq!(custom.name, "TodoOut");
    }

    #[test]
    fn relations_skipped_unless_included() {
        let m = model();
        let todo = m.entity("Todo").unwrap().clone();
        let user = m.entity("User").unwrap().clone();

        let plain = SchemaBuilder::new(todo.clone()).build().unwrap();
        assert!(plain.field("user").is_none());
        assert!(plain.field("created_at").is_some());

        let user_schema = SchemaBuilder::new(user.clone()).build().unwrap();
        let with_user = SchemaBuilder::new(todo.clone())
            .include("user", SchemaType::Nested(user_schema.clone()))
            .build()
            .unwrap();
        assert!(matches!(with_user.field("user").unwrap().ty, SchemaType::Nested(_)));

        let todo_schema = SchemaBuilder::new(todo.clone()).build().unwrap();
        assert!(SchemaBuilder::new(user.clone())
            .include("todos", SchemaType::List(todo_schema))
            .build()
            .is_ok());
        assert!(SchemaBuilder::new(user)
            .include("todos", SchemaType::Scalar(FieldType::BigInt))
            .build()
            .is_err());
        assert!(SchemaBuilder::new(todo)
            .include("user", SchemaType::List(user_schema))
            .build()
            .is_err());
    }

    #[test]
    fn required_unless_default_or_nullable() {
        let m = model();
        let todo = m.entity("Todo").unwrap().clone();
        let s = SchemaBuilder::new(todo)
            .exclude(["id"])
            .include("user", SchemaType::Scalar(FieldType::BigInt))
            .orm(false)
            .build()
            .unwrap();
        assert!(s.field("name").unwrap().required);
        assert!(!s.field("done").unwrap().required);
        assert!(!s.field("user").unwrap().required);
        assert!(!s.field("created_at").unwrap().required);
    }

    #[test]
    fn full_and_partial_validation() {
        let m = model();
        let user = m.entity("User").unwrap().clone();
        let s = SchemaBuilder::new(user).exclude(["id"]).orm(false).build().unwrap();

        let row = s.validate_full(&json!({"name": "ann", "bogus": 1})).unwrap();
        assert_eq!(row.get("name"), Some(&json!("ann")));
        assert!(!row.contains_key("bogus"));

        let err = s.validate_full(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), "name is required");
        assert!(s.validate_full(&json!({"name": null})).is_err());
        assert!(s.validate_full(&json!({"name": 5})).is_err());
        assert!(s.validate_full(&json!({"name": "much too long"})).is_err());
        assert!(s.validate_full(&json!([1])).is_err());

        let partial = s.validate_partial(&json!({})).unwrap();
        assert!(partial.is_empty());
        assert!(s.validate_partial(&json!({"name": "x".repeat(9)})).is_err());
    }
}
