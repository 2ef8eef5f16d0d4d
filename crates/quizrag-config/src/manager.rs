//! Configuration manager implementation

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::{AppConfig, CacheBackend, ConfigManager as ConfigManagerTrait},
};

const DEFAULT_ENV_PREFIX: &str = "QUIZRAG";

/// Longest TTL accepted for any cache class (one year)
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Configuration manager
pub struct ConfigManager {
    /// Configuration file path
    config_path: PathBuf,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Create with custom config path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Override the environment variable prefix
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load, then reject configurations that cannot run
    pub fn load_validated(&mut self) -> Result<AppConfig> {
        let config = self.load_config()?;
        self.validate_config(&config)?;
        Ok(config)
    }

    /// `<config dir>/quizrag/config.toml`
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizrag")
            .join("config.toml")
    }
}

impl ConfigManagerTrait for ConfigManager {
    fn load_config(&mut self) -> Result<AppConfig> {
        debug!(path = %self.config_path.display(), prefix = %self.env_prefix, "Loading configuration");
        let builder = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(false))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    fn save_config(&self, config: &AppConfig) -> Result<()> {
        let toml = toml::to_string(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }

    fn validate_config(&self, config: &AppConfig) -> Result<()> {
        let cache = &config.cache;
        if cache.namespace.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Cache namespace must not be empty".to_string(),
            ));
        }
        if cache.health_check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Health check interval must be greater than 0".to_string(),
            ));
        }
        if cache.operation_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Cache operation timeout must be greater than 0".to_string(),
            ));
        }
        let ttls = [
            ("chunk", cache.chunk_ttl_secs),
            ("quiz", cache.quiz_ttl_secs),
            ("objectives", cache.objectives_ttl_secs),
            ("search_results", cache.search_results_ttl_secs),
        ];
        if let Some((class, _)) = ttls.iter().find(|(_, ttl)| *ttl == 0) {
            return Err(ConfigError::Validation(format!(
                "TTL for {} must be greater than 0",
                class
            )));
        }
        if let Some((class, _)) = ttls.iter().find(|(_, ttl)| *ttl > MAX_TTL_SECS) {
            return Err(ConfigError::Validation(format!(
                "TTL for {} must not exceed {} seconds",
                class, MAX_TTL_SECS
            )));
        }
        if cache.enabled && cache.backend == CacheBackend::Disk && cache.disk_path.is_none() {
            return Err(ConfigError::Validation(
                "Disk cache backend requires disk_path".to_string(),
            ));
        }

        let retrieval = &config.retrieval;
        if retrieval.default_k == 0 {
            return Err(ConfigError::Validation(
                "default_k must be greater than 0".to_string(),
            ));
        }
        if retrieval.rerank_top_k == 0 || retrieval.rerank_top_n == 0 {
            return Err(ConfigError::Validation(
                "Rerank candidate counts must be greater than 0".to_string(),
            ));
        }
        if retrieval.adapter_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Adapter timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
