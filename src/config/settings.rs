//! Process settings from environment variables (`.env` is honored by the binaries via dotenvy).

use crate::error::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_CONFIG_PATH: &str = "config/sample";
pub const DEFAULT_LOG_FILTER: &str = "crud_scaffold=info,tower_http=info";
pub const DEFAULT_MAX_PAGE_LIMIT: u64 = 100;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    /// PostgreSQL URL. When unset the in-memory store is used.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub config_path: PathBuf,
    pub db_schema: Option<String>,
    /// Directory for daily-rotated log files. Stdout only when unset.
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
    pub max_page_limit: u64,
    pub body_limit_bytes: usize,
    pub version: String,
    pub title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            bind_addr: DEFAULT_BIND_ADDR.into(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            db_schema: None,
            log_dir: None,
            log_filter: DEFAULT_LOG_FILTER.into(),
            max_page_limit: DEFAULT_MAX_PAGE_LIMIT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            version: "0.0.1".into(),
            title: "crud-scaffold".into(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let max_page_limit = match get("MAX_PAGE_LIMIT") {
            Some(v) => parse_number::<u64>("MAX_PAGE_LIMIT", &v)?,
            None => defaults.max_page_limit,
        };
        if max_page_limit == 0 {
            return Err(ConfigError::Validation("MAX_PAGE_LIMIT must be at least 1".into()));
        }
        let body_limit_bytes = match get("BODY_LIMIT_BYTES") {
            Some(v) => parse_number::<usize>("BODY_LIMIT_BYTES", &v)?,
            None => defaults.body_limit_bytes,
        };

        Ok(Settings {
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            config_path: get("CONFIG_PATH").map(PathBuf::from).unwrap_or(defaults.config_path),
            db_schema: get("DB_SCHEMA"),
            log_dir: get("LOG_DIR").map(PathBuf::from),
            log_filter: get("RUST_LOG").unwrap_or(defaults.log_filter),
            max_page_limit,
            body_limit_bytes,
            version: get("TAG").unwrap_or(defaults.version),
            title: get("API_TITLE").unwrap_or(defaults.title),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert!(s.database_url.is_none());
        assert_eq!(s.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(s.max_page_limit, 100);
        assert_eq!(s.version, "0.0.1");
    }

    #[test]
    fn reads_overrides_and_treats_blank_as_unset() {
        let s = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("MAX_PAGE_LIMIT", "50"),
            ("LOG_DIR", "  "),
            ("TAG", "1.2.3"),
        ]))
        .unwrap();
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(s.max_page_limit, 50);
        assert!(s.log_dir.is_none());
        assert_eq!(s.version, "1.2.3");
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(Settings::from_lookup(lookup(&[("MAX_PAGE_LIMIT", "lots")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("MAX_PAGE_LIMIT", "0")])).is_err());
    }
}
