//! Per-field type checks and constraint rules applied to request bodies.

use crate::config::{FieldType, ValidationRule};
use crate::error::AppError;
use crate::store::value_eq;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;

/// Check that `v` fits the column type. Timestamps are normalized to UTC.
pub(crate) fn check_type(name: &str, ty: FieldType, v: Value) -> Result<Value, AppError> {
    let invalid = |what: &str| AppError::Validation(format!("{} must be {}", name, what));
    match ty {
        FieldType::Int => match v.as_i64() {
            Some(n) if i32::try_from(n).is_ok() => Ok(v),
            _ => Err(invalid("a 32-bit integer")),
        },
        FieldType::BigInt => match v.as_i64() {
            Some(_) => Ok(v),
            None => Err(invalid("an integer")),
        },
        FieldType::Float => match v {
            Value::Number(_) => Ok(v),
            _ => Err(invalid("a number")),
        },
        FieldType::Bool => match v {
            Value::Bool(_) => Ok(v),
            _ => Err(invalid("a boolean")),
        },
        FieldType::Text => match v {
            Value::String(_) => Ok(v),
            _ => Err(invalid("a string")),
        },
        FieldType::Uuid => match v.as_str().map(uuid::Uuid::parse_str) {
            Some(Ok(u)) => Ok(Value::String(u.to_string())),
            _ => Err(invalid("a valid UUID")),
        },
        FieldType::Timestamp => match v.as_str().map(DateTime::parse_from_rfc3339) {
            Some(Ok(t)) => Ok(Value::String(
                t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Micros, true),
            )),
            _ => Err(invalid("an RFC 3339 timestamp")),
        },
        FieldType::Date => match v.as_str().map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d")) {
            Some(Ok(_)) => Ok(v),
            _ => Err(invalid("a date (YYYY-MM-DD)")),
        },
        FieldType::Json => Ok(v),
    }
}

pub(crate) fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let (Some(max), Some(s)) = (rule.max_length, v.as_str()) {
        if s.chars().count() > max as usize {
            return Err(AppError::Validation(format!("{} must be at most {} characters", col, max)));
        }
    }
    if let (Some(min), Some(s)) = (rule.min_length, v.as_str()) {
        if s.chars().count() < min as usize {
            return Err(AppError::Validation(format!("{} must be at least {} characters", col, min)));
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let (Some(min), Some(n)) = (rule.minimum, v.as_f64()) {
        if n < min {
            return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
        }
    }
    if let (Some(max), Some(n)) = (rule.maximum, v.as_f64()) {
        if n > max {
            return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
        }
    }
    Ok(())
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err(AppError::Validation(format!("{} must be a valid email", col)));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(AppError::Validation(format!("{} must be a valid UUID", col)));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_are_range_checked() {
        assert!(check_type("n", FieldType::Int, json!(5)).is_ok());
        assert!(check_type("n", FieldType::Int, json!(5_000_000_000i64)).is_err());
        assert!(check_type("n", FieldType::BigInt, json!(5_000_000_000i64)).is_ok());
        assert!(check_type("n", FieldType::BigInt, json!("5")).is_err());
        assert!(check_type("n", FieldType::Int, json!(1.5)).is_err());
    }

    #[test]
    fn timestamps_normalize_to_utc() {
        let v = check_type("at", FieldType::Timestamp, json!("2024-03-01T10:00:00+02:00")).unwrap();
        assert_eq!(v, json!("2024-03-01T08:00:00.000000Z"));
        assert!(check_type("at", FieldType::Timestamp, json!("yesterday")).is_err());
        assert!(check_type("on", FieldType::Date, json!("2024-02-30")).is_err());
    }

    #[test]
    fn rules_apply_to_present_values() {
        let rule = ValidationRule {
            min_length: Some(2),
            max_length: Some(4),
            allowed: Some(vec![json!("ab"), json!("abc")]),
            ..Default::default()
        };
        assert!(validate_field("code", &json!("ab"), &rule).is_ok());
        assert!(validate_field("code", &json!("a"), &rule).is_err());
        assert!(validate_field("code", &json!("abcd"), &rule).is_err());
        assert!(validate_field("code", &Value::Null, &rule).is_ok());

        let email = ValidationRule {
            format: Some("email".into()),
            ..Default::default()
        };
        let err = validate_field("mail", &json!("nope"), &email).unwrap_err();
        assert_eq!(err.to_string(), "mail must be a valid email");
    }
}
