//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::ValidationError;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SERVICE_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Read and parse a TOML file. Validation runs after environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Apply `SERVICE_*` overrides on top of a parsed configuration.
///
/// `lookup` resolves a variable name to its value; the process environment
/// is used in production, a map in tests.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), Vec<ValidationError>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(host) = var("HOST") {
        config.server.host = host;
    }
    if let Some(port) = var("PORT") {
        parse_into(&mut errors, "server.port", &port, &mut config.server.port);
    }
    if let Some(secs) = var("SHUTDOWN_TIMEOUT_SECS") {
        parse_into(
            &mut errors,
            "server.shutdown_timeout_secs",
            &secs,
            &mut config.server.shutdown_timeout_secs,
        );
    }
    if let Some(url) = var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(url) = var("CACHE_URL") {
        config.cache.url = url;
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_into<T: FromStr>(errors: &mut Vec<ValidationError>, field: &str, raw: &str, slot: &mut T) {
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => errors.push(ValidationError::new(field, format!("`{}` is not a valid value", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        [server]
        port = 9000
        shutdown_timeout_secs = 10

        [database]
        url = "postgres://localhost/app"

        [cache]
        url = "redis://localhost:6379"
    "#;

    #[test]
    fn test_parse_fills_defaults() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.shutdown_timeout_secs, 10);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let err = parse_config("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/service.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_reads_file_without_validating() {
        let path = std::env::temp_dir().join(format!("service-lifecycle-{}.toml", std::process::id()));
        fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let config = load_config(&path);
        let _ = fs::remove_file(&path);

        let config = config.unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(config.database.url.is_empty());
    }

    #[test]
    fn test_env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SERVICE_PORT", "7070"),
            ("SERVICE_CACHE_URL", "redis://cache:6379"),
        ]);
        let mut config = parse_config(SAMPLE).unwrap();

        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.cache.url, "redis://cache:6379");
        assert_eq!(config.database.url, "postgres://localhost/app");
    }

    #[test]
    fn test_unparsable_override_is_reported() {
        let mut config = AppConfig::default();
        let errors = apply_env_overrides(&mut config, |k| {
            (k == "SERVICE_PORT").then(|| "99999".to_string())
        })
        .unwrap_err();

        assert_eq!(errors[0].field, "server.port");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigError::Validation(vec![
            ValidationError::new("database.url", "must not be empty"),
            ValidationError::new("cache.url", "must not be empty"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: database.url: must not be empty, cache.url: must not be empty"
        );
    }
}
