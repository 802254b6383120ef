//! Raw entity declarations as loaded from `entities.json`.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name, e.g. "Todo". Used in schema names.
    pub name: String,
    pub table: String,
    /// Route path segment, e.g. "todo".
    pub path: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Soft-delete entities keep removed rows with `deleted = true`.
    #[serde(default = "default_true")]
    pub soft_delete: bool,
    pub fields: Vec<FieldConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// Column type. Optional only for to-many relations, which are not stored.
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultConfig>,
    #[serde(default)]
    pub relation: Option<RelationConfig>,
    #[serde(default)]
    pub validation: ValidationRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKindConfig {
    One,
    Many,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Target entity name.
    pub entity: String,
    pub kind: RelationKindConfig,
    /// For `many`: the to-one field on the target that points back here.
    #[serde(default)]
    pub via: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub enum DefaultConfig {
    Literal(serde_json::Value),
    Expression { expression: String },
}

impl<'de> Deserialize<'de> for DefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::String(s)) = obj.remove("expression") {
                    return Ok(DefaultConfig::Expression { expression: s });
                }
                if let Some(lit) = obj.remove("value").or_else(|| obj.remove("literal")) {
                    return Ok(DefaultConfig::Literal(lit));
                }
                Err(serde::de::Error::custom(format!(
                    "field default must be a scalar, {{ \"expression\": \"...\" }}, or {{ \"value\": ... }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            serde_json::Value::Array(_) => Err(serde::de::Error::custom(
                "field default must be a scalar or an object, got array",
            )),
            scalar => Ok(DefaultConfig::Literal(scalar)),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// All declarations in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
    /// Database schema for entities that do not name one.
    pub default_schema: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_accepts_scalars_and_expressions() {
        let lit: DefaultConfig = serde_json::from_str("false").unwrap();
        assert!(matches!(lit, DefaultConfig::Literal(serde_json::Value::Bool(false))));

        let expr: DefaultConfig = serde_json::from_str(r#"{"expression": "now()"}"#).unwrap();
        assert!(matches!(expr, DefaultConfig::Expression { ref expression } if expression == "now()"));

        let wrapped: DefaultConfig = serde_json::from_str(r#"{"value": 3}"#).unwrap();
        assert!(matches!(wrapped, DefaultConfig::Literal(serde_json::Value::Number(_))));

        assert!(serde_json::from_str::<DefaultConfig>(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn field_defaults_to_nullable_without_relation() {
        let f: FieldConfig = serde_json::from_str(r#"{"name": "title", "type": "text"}"#).unwrap();
        assert!(f.nullable);
        assert!(!f.primary_key);
        assert!(f.relation.is_none());
        assert_eq!(f.validation, ValidationRule::default());
    }
}
