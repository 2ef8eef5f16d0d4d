//! Health-checked cache facade
//!
//! Every public operation absorbs store failures: lookups become misses,
//! writes become `false`, bulk calls report how much actually happened.

use std::{future::Future, sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    BatchEntry, CacheClass, CacheEntry, CacheError, CacheMetrics, CacheStats, CacheStore,
    GatewayConfig, HealthMonitor, KeyDeriver, Result,
};

/// Result of [`CacheGateway::health`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub connected: bool,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Connected and a write/read/delete round trip succeeded
    Healthy,
    /// Connected but the round trip did not behave
    Unhealthy,
    Disconnected,
    Disabled,
}

/// Result of [`CacheGateway::diagnose`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDiagnostics {
    pub status: CacheStatus,
    pub connected: bool,
    pub operations_working: bool,
    pub stats: CacheStats,
}

/// Cache gateway shared by retrieval and generation code
pub struct CacheGateway {
    store: Option<Arc<dyn CacheStore>>,
    keys: KeyDeriver,
    config: GatewayConfig,
    health: HealthMonitor,
    metrics: CacheMetrics,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>, config: GatewayConfig) -> Self {
        Self::with_store(Some(store), config)
    }

    /// Gateway without a backing store: every lookup misses, every write fails
    pub fn disabled(config: GatewayConfig) -> Self {
        warn!(namespace = %config.namespace, "Cache disabled, running without a backing store");
        Self::with_store(None, config)
    }

    pub fn builder() -> CacheGatewayBuilder {
        CacheGatewayBuilder::new()
    }

    fn with_store(store: Option<Arc<dyn CacheStore>>, config: GatewayConfig) -> Self {
        Self {
            store,
            keys: KeyDeriver::new(config.namespace.clone()),
            health: HealthMonitor::new(config.health_check_interval, config.operation_timeout),
            metrics: CacheMetrics::new(),
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Probe the store immediately, ignoring the throttle
    pub async fn connect(&self) -> bool {
        match &self.store {
            Some(store) => self.health.probe(store.as_ref()).await,
            None => false,
        }
    }

    /// Cached payload for `(class, identifier)`, or `None` on any kind of miss
    pub async fn get<T: DeserializeOwned>(&self, class: CacheClass, identifier: &str) -> Option<T> {
        let Some(store) = self.available_store().await else {
            self.metrics.record_miss();
            return None;
        };

        let key = self.keys.derive(class, identifier);
        self.metrics.record_operation();
        let raw = match self.guarded("get", store.get(&key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) | Err(_) => {
                self.metrics.record_miss();
                return None;
            }
        };

        match decode::<T>(&key, &raw) {
            Ok(payload) => {
                self.metrics.record_hit();
                debug!(key = %key, "Cache hit");
                Some(payload)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed cache entry");
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Store `payload`, using the class TTL unless `ttl` overrides it
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        class: CacheClass,
        identifier: &str,
        payload: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(store) = self.available_store().await else {
            return false;
        };

        let ttl = ttl.unwrap_or_else(|| self.config.ttls.for_class(class));
        let key = self.keys.derive(class, identifier);
        let encoded = match encode(&key, class, payload, ttl) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize cache payload");
                self.metrics.record_error();
                return false;
            }
        };

        self.metrics.record_operation();
        self.guarded("set", store.set_ex(&key, &encoded, ttl))
            .await
            .is_ok()
    }

    /// Write many entries in one store call, returning how many succeeded
    pub async fn set_batch(&self, entries: Vec<BatchEntry>, ttl: Option<Duration>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let Some(store) = self.available_store().await else {
            return 0;
        };

        // The store call takes one TTL; without an override the first entry's
        // class decides it.
        let ttl = ttl.unwrap_or_else(|| self.config.ttls.for_class(entries[0].class));
        let mut encoded = Vec::with_capacity(entries.len());
        for entry in &entries {
            let key = self.keys.derive(entry.class, &entry.identifier);
            match encode(&key, entry.class, &entry.payload, ttl) {
                Ok(value) => encoded.push((key, value)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unserializable batch entry");
                    self.metrics.record_error();
                }
            }
        }

        self.metrics.record_operation();
        match self.guarded("set_batch", store.set_many(&encoded, ttl)).await {
            Ok(outcomes) => {
                let succeeded = outcomes.iter().filter(|ok| **ok).count();
                if succeeded < entries.len() {
                    debug!(
                        succeeded,
                        total = entries.len(),
                        "Partial cache batch write"
                    );
                }
                succeeded
            }
            Err(_) => 0,
        }
    }

    /// Delete every namespaced key matching `pattern` (all keys when `None`)
    pub async fn invalidate(&self, pattern: Option<&str>) -> usize {
        let Some(store) = self.available_store().await else {
            return 0;
        };

        let glob = self.keys.pattern(pattern);
        self.metrics.record_operation();
        let keys = match self.guarded("keys", store.keys(&glob)).await {
            Ok(keys) => keys,
            Err(_) => return 0,
        };
        if keys.is_empty() {
            return 0;
        }

        let deleted = self
            .guarded("delete", store.delete(&keys))
            .await
            .unwrap_or(0);
        debug!(pattern = %glob, deleted, "Invalidated cache entries");
        deleted
    }

    /// Connectivity (throttled probe) plus counters
    pub async fn health(&self) -> CacheHealth {
        if let Some(store) = &self.store {
            self.health.check(store.as_ref()).await;
        }
        let stats = self.stats().await;
        CacheHealth {
            connected: stats.is_connected,
            stats,
        }
    }

    /// Counters without probing
    pub async fn stats(&self) -> CacheStats {
        let (connected, last_check) = self.health.snapshot().await;
        self.metrics.snapshot(connected, last_check)
    }

    /// Functional check: write, read back and delete a reserved key
    pub async fn diagnose(&self) -> CacheDiagnostics {
        let Some(store) = &self.store else {
            return CacheDiagnostics {
                status: CacheStatus::Disabled,
                connected: false,
                operations_working: false,
                stats: self.stats().await,
            };
        };

        let connected = self.health.check(store.as_ref()).await;
        let operations_working = connected && self.round_trip(store.as_ref()).await;
        let status = match (connected, operations_working) {
            (false, _) => CacheStatus::Disconnected,
            (true, true) => CacheStatus::Healthy,
            (true, false) => CacheStatus::Unhealthy,
        };

        CacheDiagnostics {
            status,
            connected,
            operations_working,
            stats: self.stats().await,
        }
    }

    /// Reset counters; test harnesses only
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    async fn round_trip(&self, store: &dyn CacheStore) -> bool {
        let key = self.keys.health_key();
        let probe = chrono::Utc::now().to_rfc3339();

        if self
            .guarded("diagnose", store.set_ex(&key, &probe, Duration::from_secs(10)))
            .await
            .is_err()
        {
            return false;
        }
        let read_back = self.guarded("diagnose", store.get(&key)).await;
        let deleted = self
            .guarded("diagnose", store.delete(std::slice::from_ref(&key)))
            .await;

        matches!(read_back, Ok(Some(ref value)) if *value == probe) && deleted.is_ok()
    }

    async fn available_store(&self) -> Option<&Arc<dyn CacheStore>> {
        let store = self.store.as_ref()?;
        if self.health.check(store.as_ref()).await {
            Some(store)
        } else {
            debug!("Cache unhealthy, skipping store call");
            None
        }
    }

    /// Run a store call under the operation timeout, recording failures
    async fn guarded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome = match tokio::time::timeout(self.config.operation_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CacheError::Timeout {
                millis: self.config.operation_timeout.as_millis() as u64,
            }),
        };

        match &outcome {
            Err(e @ CacheError::Malformed { .. }) => {
                warn!(operation, error = %e, "Ignoring malformed cache entry");
            }
            Err(e) => {
                warn!(operation, error = %e, "Cache operation failed");
                self.metrics.record_error();
                if e.is_connectivity() {
                    self.health.mark_disconnected(operation).await;
                }
            }
            Ok(_) => {}
        }
        outcome
    }
}

fn encode<T: Serialize + ?Sized>(
    key: &str,
    class: CacheClass,
    payload: &T,
    ttl: Duration,
) -> Result<String> {
    let payload = serde_json::to_value(payload).map_err(|e| CacheError::Serialization {
        message: e.to_string(),
    })?;
    let entry = CacheEntry::new(key, class, payload, ttl);
    Ok(serde_json::to_string(&entry)?)
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    let malformed = |e: serde_json::Error| CacheError::Malformed {
        key: key.to_string(),
        message: e.to_string(),
    };
    let entry: CacheEntry = serde_json::from_str(raw).map_err(malformed)?;
    serde_json::from_value(entry.payload).map_err(malformed)
}

/// Builder for [`CacheGateway`]
#[derive(Default)]
pub struct CacheGatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn CacheStore>>,
}

impl CacheGatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    pub fn ttl(mut self, class: CacheClass, ttl: Duration) -> Self {
        match class {
            CacheClass::Chunk => self.config.ttls.chunk = ttl,
            CacheClass::Quiz => self.config.ttls.quiz = ttl,
            CacheClass::Objectives => self.config.ttls.objectives = ttl,
            CacheClass::SearchResults => self.config.ttls.search_results = ttl,
        }
        self
    }

    /// Gateway over the configured store, or a disabled gateway without one
    pub fn build(self) -> CacheGateway {
        match self.store {
            Some(store) => CacheGateway::new(store, self.config),
            None => CacheGateway::disabled(self.config),
        }
    }
}
