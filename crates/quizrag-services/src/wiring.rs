//! Translation from file/environment settings to component configuration

use std::{sync::Arc, time::Duration};

use quizrag_cache::{CacheGateway, CacheStore, CacheTtls, DiskStore, GatewayConfig, MemoryStore};
use quizrag_config::{
    CacheBackend, CacheSettings, FirstPassSetting, FusionSetting, RetrievalSettings,
};
use quizrag_retrieval::{FusionMethod, OrchestratorConfig, SearchStrategy};
use tracing::{info, warn};

pub fn gateway_config(settings: &CacheSettings) -> GatewayConfig {
    GatewayConfig {
        namespace: settings.namespace.clone(),
        health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
        operation_timeout: Duration::from_millis(settings.operation_timeout_ms),
        ttls: CacheTtls {
            chunk: Duration::from_secs(settings.chunk_ttl_secs),
            quiz: Duration::from_secs(settings.quiz_ttl_secs),
            objectives: Duration::from_secs(settings.objectives_ttl_secs),
            search_results: Duration::from_secs(settings.search_results_ttl_secs),
        },
    }
}

/// The configured backing store, or `None` when caching is off
pub fn cache_store(settings: &CacheSettings) -> Option<Arc<dyn CacheStore>> {
    if !settings.enabled {
        return None;
    }
    match (settings.backend, settings.disk_path.as_ref()) {
        (CacheBackend::Memory, _) => Some(Arc::new(MemoryStore::new())),
        (CacheBackend::Disk, Some(path)) => {
            info!(path = %path.display(), "Using disk cache store");
            Some(Arc::new(DiskStore::new(path)))
        }
        (CacheBackend::Disk, None) => {
            warn!("Disk cache backend selected without disk_path");
            None
        }
    }
}

pub fn build_gateway(settings: &CacheSettings) -> CacheGateway {
    let config = gateway_config(settings);
    match cache_store(settings) {
        Some(store) => CacheGateway::new(store, config),
        None => CacheGateway::disabled(config),
    }
}

pub fn orchestrator_config(settings: &RetrievalSettings) -> OrchestratorConfig {
    let fusion = match settings.fusion {
        FusionSetting::Priority => FusionMethod::Priority,
        FusionSetting::ReciprocalRank => FusionMethod::ReciprocalRank { k: settings.rrf_k },
    };
    let first_pass = match settings.first_pass_strategy {
        FirstPassSetting::Dense => SearchStrategy::Dense,
        FirstPassSetting::Sparse => SearchStrategy::Sparse,
        FirstPassSetting::Hybrid => SearchStrategy::Hybrid,
    };
    OrchestratorConfig {
        adapter_timeout: Duration::from_millis(settings.adapter_timeout_ms),
        rerank_top_k: settings.rerank_top_k,
        fusion,
        first_pass,
    }
}

/// Connection settings for a Qdrant collection using the configured timeouts
#[cfg(feature = "qdrant")]
pub fn qdrant_config(
    settings: &RetrievalSettings,
    uri: impl Into<String>,
    collection_name: impl Into<String>,
    dimension: u64,
) -> quizrag_retrieval::QdrantConfig {
    quizrag_retrieval::QdrantConfig {
        uri: uri.into(),
        collection_name: collection_name.into(),
        dimension,
        connect_timeout_ms: settings.adapter_connect_timeout_ms,
        timeout_ms: settings.adapter_timeout_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_settings_map_to_gateway_config() {
        let settings = CacheSettings {
            namespace: "course".to_string(),
            health_check_interval_secs: 12,
            operation_timeout_ms: 250,
            quiz_ttl_secs: 60,
            ..CacheSettings::default()
        };
        let config = gateway_config(&settings);
        assert_eq!(config.namespace, "course");
        assert_eq!(config.health_check_interval, Duration::from_secs(12));
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.ttls.quiz, Duration::from_secs(60));
        assert_eq!(config.ttls.chunk, Duration::from_secs(3600));
    }

    #[test]
    fn disabled_cache_has_no_store() {
        let settings = CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        };
        assert!(cache_store(&settings).is_none());
        assert!(!build_gateway(&settings).is_enabled());
    }

    #[test]
    fn disk_backend_without_path_degrades_to_disabled() {
        let settings = CacheSettings {
            backend: CacheBackend::Disk,
            ..CacheSettings::default()
        };
        assert!(!build_gateway(&settings).is_enabled());
    }

    #[test]
    fn retrieval_settings_map_to_orchestrator_config() {
        let settings = RetrievalSettings {
            fusion: FusionSetting::ReciprocalRank,
            rrf_k: 20,
            first_pass_strategy: FirstPassSetting::Sparse,
            adapter_timeout_ms: 800,
            ..RetrievalSettings::default()
        };
        let config = orchestrator_config(&settings);
        assert_eq!(config.fusion, FusionMethod::ReciprocalRank { k: 20 });
        assert_eq!(config.first_pass, SearchStrategy::Sparse);
        assert_eq!(config.adapter_timeout, Duration::from_millis(800));
        assert_eq!(config.rerank_top_k, 10);
    }
}
