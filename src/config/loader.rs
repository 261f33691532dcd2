//! Configuration Loader
//!
//! Environment-aware configuration loading: baked-in defaults, an optional
//! environment-specific TOML file, then `MAILROUTE_`-prefixed environment
//! variables, each layer overriding the last. The merged result is validated
//! before use.

use super::MailRouteConfig;
use crate::error::{MailRouteError, Result};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loaded configuration plus the environment it was resolved for.
pub struct ConfigManager {
    config: MailRouteConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory.
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit
    /// environment; used by tests that must not touch process-global state.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build_config(&config_directory, environment)?;
        config
            .validate()
            .map_err(MailRouteError::ConfigurationError)?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
        }))
    }

    fn build_config(config_directory: &Path, environment: &str) -> Result<MailRouteConfig> {
        let defaults = Config::try_from(&MailRouteConfig::default())
            .map_err(|e| MailRouteError::ConfigurationError(e.to_string()))?;

        let base_file = config_directory.join("mailroute");
        let env_file = config_directory.join(format!("mailroute.{environment}"));

        Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(base_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                File::from(env_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix("MAILROUTE").separator("__"))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| MailRouteError::ConfigurationError(e.to_string()))
    }

    fn detect_environment() -> String {
        env::var("MAILROUTE_ENV").unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }

    pub fn config(&self) -> &MailRouteConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}
