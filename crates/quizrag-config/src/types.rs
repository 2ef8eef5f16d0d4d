//! Core configuration types and data structures

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheSettings,
    pub retrieval: RetrievalSettings,
    pub logging: LoggingSettings,
}

/// Backing store used by the cache gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
}

/// Cache gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// When false the gateway runs without a store: all misses
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Directory for the disk backend
    pub disk_path: Option<PathBuf>,
    /// Key prefix shared by every cached artifact
    pub namespace: String,
    pub health_check_interval_secs: u64,
    pub operation_timeout_ms: u64,
    pub chunk_ttl_secs: u64,
    pub quiz_ttl_secs: u64,
    pub objectives_ttl_secs: u64,
    pub search_results_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            disk_path: None,
            namespace: "quiz_gen".to_string(),
            health_check_interval_secs: 30,
            operation_timeout_ms: 5_000,
            chunk_ttl_secs: 3_600,
            quiz_ttl_secs: 1_800,
            objectives_ttl_secs: 7_200,
            search_results_ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionSetting {
    #[default]
    Priority,
    ReciprocalRank,
}

/// Where rerank candidates come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FirstPassSetting {
    Dense,
    Sparse,
    #[default]
    Hybrid,
}

/// Retrieval orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_k: usize,
    /// Candidates handed to the reranker
    pub rerank_top_k: usize,
    /// Candidates the cross-encoder keeps
    pub rerank_top_n: usize,
    pub adapter_connect_timeout_ms: u64,
    pub adapter_timeout_ms: u64,
    pub fusion: FusionSetting,
    pub rrf_k: usize,
    pub first_pass_strategy: FirstPassSetting,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_k: 5,
            rerank_top_k: 10,
            rerank_top_n: 3,
            adapter_connect_timeout_ms: 3_000,
            adapter_timeout_ms: 15_000,
            fusion: FusionSetting::Priority,
            rrf_k: 60,
            first_pass_strategy: FirstPassSetting::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Optional `EnvFilter` directive, overrides `level`
    pub filter: Option<String>,
    /// Include targets and line numbers
    pub debug: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filter: None,
            debug: false,
        }
    }
}

/// Loading, persisting and checking an [`AppConfig`]
pub trait ConfigManager {
    /// Merge the config file (if any) with environment overrides
    fn load_config(&mut self) -> crate::Result<AppConfig>;
    fn save_config(&self, config: &AppConfig) -> crate::Result<()>;
    fn validate_config(&self, config: &AppConfig) -> crate::Result<()>;
}
