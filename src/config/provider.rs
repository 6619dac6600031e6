//! Configuration providers.
//!
//! A provider yields a fully validated [`AppConfig`] or fails. It never
//! returns a partially valid configuration.

use std::path::PathBuf;

use crate::config::loader::{apply_env_overrides, load_config, ConfigError};
use crate::config::schema::AppConfig;
use crate::config::validation::validate_config;

/// Source of the startup configuration.
pub trait ConfigProvider: Send + Sync {
    /// Produce a validated configuration snapshot.
    fn load(&self) -> Result<AppConfig, ConfigError>;
}

/// Loads an optional TOML file, then applies `SERVICE_*` environment overrides.
#[derive(Debug, Clone, Default)]
pub struct FileConfigProvider {
    path: Option<PathBuf>,
}

impl FileConfigProvider {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => load_config(path)?,
            None => AppConfig::default(),
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok())
            .map_err(ConfigError::Validation)?;
        validate_config(&config).map_err(ConfigError::Validation)?;

        tracing::debug!(path = ?self.path, "Configuration loaded from file and environment");
        Ok(config)
    }
}

/// Serves a fixed configuration value. The value is still validated on load.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: AppConfig,
}

impl StaticConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self) -> Result<AppConfig, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_validates() {
        let provider = StaticConfigProvider::new(AppConfig::default());
        match provider.load() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_static_provider_returns_value() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/app".into();
        config.cache.url = "redis://localhost".into();

        let loaded = StaticConfigProvider::new(config.clone()).load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_file_provider_missing_file() {
        let provider = FileConfigProvider::new(Some(PathBuf::from("/nonexistent/service.toml")));
        assert!(matches!(provider.load(), Err(ConfigError::Io(_))));
    }
}
