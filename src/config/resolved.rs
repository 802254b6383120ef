//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Bookkeeping column names managed by the accessor.
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED: &str = "deleted";
pub const DELETED_AT: &str = "deleted_at";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Int,
    BigInt,
    Float,
    Bool,
    Text,
    Uuid,
    Timestamp,
    Date,
    Json,
}

impl FieldType {
    pub fn parse(name: &str) -> Option<FieldType> {
        let lower = name.trim().to_lowercase();
        Some(match lower.as_str() {
            "int" | "int4" | "integer" | "serial" => FieldType::Int,
            "bigint" | "int8" | "bigserial" => FieldType::BigInt,
            "float" | "float8" | "double precision" | "real" => FieldType::Float,
            "bool" | "boolean" => FieldType::Bool,
            "text" | "string" | "varchar" => FieldType::Text,
            "uuid" => FieldType::Uuid,
            "timestamptz" | "timestamp" | "timestamp with time zone" | "datetime" => FieldType::Timestamp,
            "date" => FieldType::Date,
            "json" | "jsonb" => FieldType::Json,
            _ => return None,
        })
    }

    /// PostgreSQL type name, used for DDL and parameter casts.
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldType::Int => "integer",
            FieldType::BigInt => "bigint",
            FieldType::Float => "double precision",
            FieldType::Bool => "boolean",
            FieldType::Text => "text",
            FieldType::Uuid => "uuid",
            FieldType::Timestamp => "timestamptz",
            FieldType::Date => "date",
            FieldType::Json => "jsonb",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::BigInt)
    }
}

/// Default applied when an insert leaves a column out.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Now,
    Identity,
    RandomUuid,
    /// Opaque SQL expression; only PostgreSQL can evaluate it.
    Expression(String),
}

impl DefaultValue {
    pub fn from_expression(expr: &str) -> DefaultValue {
        match expr.trim().to_lowercase().as_str() {
            "now()" | "now" | "current_timestamp" => DefaultValue::Now,
            "identity" | "autoincrement" => DefaultValue::Identity,
            "gen_random_uuid()" | "uuid" => DefaultValue::RandomUuid,
            _ => DefaultValue::Expression(expr.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// This entity stores the target's key in the field's column.
    One,
    /// The target stores our key in its `via` field; nothing stored here.
    Many,
}

#[derive(Clone, Debug)]
pub struct RelationInfo {
    /// Target entity name.
    pub target: String,
    pub kind: RelationKind,
    pub via: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    /// None only for to-many relations.
    pub ty: Option<FieldType>,
    pub primary_key: bool,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub relation: Option<RelationInfo>,
    pub validation: ValidationRule,
}

impl FieldInfo {
    /// Whether the field has a column in the table.
    pub fn is_stored(&self) -> bool {
        self.ty.is_some()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePolicy {
    Soft,
    Hard,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub pk_column: String,
    pub pk_type: FieldType,
    pub fields: Vec<FieldInfo>,
    pub delete_policy: DeletePolicy,
}

impl ResolvedEntity {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields backed by a table column, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_stored())
    }

    pub fn column_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).and_then(|f| f.ty)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_type(name).is_some()
    }

    /// Filters that hide soft-deleted rows. Empty for hard-delete entities.
    pub fn visible_filters(&self) -> Vec<(String, Value)> {
        match self.delete_policy {
            DeletePolicy::Soft => vec![(DELETED.to_string(), Value::Bool(false))],
            DeletePolicy::Hard => Vec::new(),
        }
    }

    pub fn is_bookkeeping(name: &str) -> bool {
        matches!(name, CREATED_AT | UPDATED_AT | DELETED | DELETED_AT)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<Arc<ResolvedEntity>>,
    pub entity_by_name: HashMap<String, Arc<ResolvedEntity>>,
    pub entity_by_path: HashMap<String, Arc<ResolvedEntity>>,
}

impl ResolvedModel {
    pub fn entity(&self, name: &str) -> Option<&Arc<ResolvedEntity>> {
        self.entity_by_name.get(name)
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&Arc<ResolvedEntity>> {
        self.entity_by_path.get(path)
    }
}
