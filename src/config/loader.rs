//! Configuration Loader
//!
//! Environment-aware layered loading on top of the `config` crate. Sources, in
//! increasing priority:
//!
//! 1. `config/cascade.{toml,yaml,json}` (optional)
//! 2. `config/cascade.<environment>.{toml,yaml,json}` (optional)
//! 3. an explicit file passed by the caller (required when given)
//! 4. `CASCADE__`-prefixed environment variables, `__` separating sections,
//!    e.g. `CASCADE__SCHEDULER__CONFLICT_PAUSE_MS=250`

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_CONFIG_BASE: &str = "config/cascade";
const ENV_PREFIX: &str = "CASCADE";

/// Loaded, validated engine configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    explicit_source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_path(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from_path(path: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_with_env(path, &environment)
    }

    /// Load configuration with an explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_with_env(path: Option<PathBuf>, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            environment = %environment,
            explicit_source = ?path,
            "Loading engine configuration"
        );

        let mut builder = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_BASE).required(false))
            .add_source(File::with_name(&format!("{DEFAULT_CONFIG_BASE}.{environment}")).required(false));

        if let Some(explicit) = &path {
            if !explicit.exists() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: explicit.clone(),
                });
            }
            builder = builder.add_source(File::from(explicit.as_path()).required(true));
        }

        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            execution_mode = ?config.router.execution_mode,
            failure_policy = ?config.scheduler.dependency_failure_policy,
            "✅ Engine configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            explicit_source: path,
        }))
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            explicit_source: None,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn explicit_source(&self) -> Option<&Path> {
        self.explicit_source.as_deref()
    }

    fn detect_environment() -> String {
        env::var("CASCADE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DependencyFailurePolicy;
    use crate::routing::ExecutionMode;
    use std::io::Write;

    #[test]
    fn test_load_without_files_uses_defaults() {
        let manager = ConfigManager::load_with_env(None, "test").unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().cascade.retry.max_attempts, 3);
        assert!(manager.explicit_source().is_none());
    }

    #[test]
    fn test_load_explicit_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[router]
execution_mode = "fast"

[cascade.retry]
max_attempts = 5

[cascade.circuit_breaker]
failure_threshold = 2

[scheduler]
dependency_failure_policy = "block"
conflict_pause_ms = 50
"#
        )
        .unwrap();

        let manager = ConfigManager::load_with_env(Some(file.path().to_path_buf()), "test").unwrap();
        let config = manager.config();
        assert_eq!(config.router.execution_mode, ExecutionMode::Fast);
        assert_eq!(config.cascade.retry.max_attempts, 5);
        assert_eq!(config.cascade.retry.server_error_max_attempts, 2);
        assert_eq!(config.cascade.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.scheduler.dependency_failure_policy, DependencyFailurePolicy::Block);
        assert_eq!(config.scheduler.conflict_pause_ms, 50);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigManager::load_with_env(Some(PathBuf::from("/nonexistent/cascade.toml")), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cascade]\nmax_concurrent_per_provider = 0").unwrap();

        let result = ConfigManager::load_with_env(Some(file.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }
}
