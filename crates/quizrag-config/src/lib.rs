//! Configuration for the quiz generator retrieval core.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `QUIZRAG_`-prefixed environment variables (`QUIZRAG_CACHE__NAMESPACE`).

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::{ConfigManager, MAX_TTL_SECS};
pub use types::{
    AppConfig, CacheBackend, CacheSettings, ConfigManager as ConfigManagerTrait,
    FirstPassSetting, FusionSetting, LoggingSettings, RetrievalSettings,
};
