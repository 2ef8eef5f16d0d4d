//! Gateway configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CacheClass;

/// Default TTL per artifact class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtls {
    pub chunk: Duration,
    pub quiz: Duration,
    pub objectives: Duration,
    pub search_results: Duration,
}

impl CacheTtls {
    pub fn for_class(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Chunk => self.chunk,
            CacheClass::Quiz => self.quiz,
            CacheClass::Objectives => self.objectives,
            CacheClass::SearchResults => self.search_results,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            chunk: Duration::from_secs(3600),
            quiz: Duration::from_secs(1800),
            objectives: Duration::from_secs(7200),
            search_results: Duration::from_secs(900),
        }
    }
}

/// Configuration for a [`CacheGateway`](crate::CacheGateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Prefix of every key written by the gateway
    pub namespace: String,
    /// Minimum spacing between two connectivity probes
    pub health_check_interval: Duration,
    /// Upper bound on a single store call
    pub operation_timeout: Duration,
    pub ttls: CacheTtls,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            namespace: "quiz_gen".to_string(),
            health_check_interval: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(5),
            ttls: CacheTtls::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_match_artifact_classes() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.for_class(CacheClass::Chunk).as_secs(), 3600);
        assert_eq!(ttls.for_class(CacheClass::Quiz).as_secs(), 1800);
        assert_eq!(ttls.for_class(CacheClass::Objectives).as_secs(), 7200);
        assert_eq!(ttls.for_class(CacheClass::SearchResults).as_secs(), 900);
    }

    #[test]
    fn default_gateway_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.namespace, "quiz_gen");
        assert_eq!(config.health_check_interval, Duration::from_secs(30));
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
    }
}
