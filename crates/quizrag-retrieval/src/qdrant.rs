//! Qdrant-backed vector search.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{self, value::Kind, SearchPoints, Value},
    Qdrant,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    dense::{VectorHit, VectorSearchBackend},
    AdapterHealth, Passage, PassageMetadata,
};

#[derive(Debug, Clone, Deserialize)]
pub struct QdrantConfig {
    pub uri: String,
    pub collection_name: String,
    pub dimension: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

fn default_timeout_ms() -> u64 {
    15_000
}

pub struct QdrantVectorBackend {
    client: Qdrant,
    config: QdrantConfig,
    health: Arc<AdapterHealth>,
}

impl QdrantVectorBackend {
    pub fn new(config: QdrantConfig) -> Result<Self> {
        Self::with_health(config, Arc::new(AdapterHealth::default()))
    }

    pub fn with_health(config: QdrantConfig, health: Arc<AdapterHealth>) -> Result<Self> {
        let client = Qdrant::from_url(&config.uri)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            config,
            health,
        })
    }

    pub fn health(&self) -> &AdapterHealth {
        &self.health
    }

    pub async fn health_check(&self) -> Result<()> {
        let name = self.config.collection_name.clone();
        self.call_with_retry("health_check", || {
            let name = name.clone();
            async move {
                if self.client.collection_exists(&name).await? {
                    Ok(())
                } else {
                    Err(anyhow!("collection {} missing", name))
                }
            }
        })
        .await
    }

    async fn search_points(&self, vector: Arc<Vec<f32>>, limit: usize) -> Result<Vec<VectorHit>> {
        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.config.collection_name.clone(),
                vector: vector.as_ref().clone(),
                limit: limit as u64,
                with_payload: Some(qdrant::WithPayloadSelector {
                    selector_options: Some(qdrant::with_payload_selector::SelectorOptions::Enable(
                        true,
                    )),
                }),
                ..Default::default()
            })
            .await?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let payload = &point.payload;
            let Some(content) = payload_to_string(payload.get("content")) else {
                warn!(
                    collection = %self.config.collection_name,
                    "Skipping point without content payload"
                );
                continue;
            };
            let chunk_index = match chunk_index(payload.get("chunk_index")) {
                Ok(index) => index,
                Err(raw) => {
                    warn!(
                        collection = %self.config.collection_name,
                        chunk_index = raw,
                        "Skipping point with out-of-range chunk_index"
                    );
                    continue;
                }
            };
            let mut metadata = PassageMetadata::new(
                payload_to_string(payload.get("source_id")).unwrap_or_default(),
                chunk_index,
            );
            for (key, value) in payload {
                if matches!(key.as_str(), "content" | "source_id" | "chunk_index") {
                    continue;
                }
                if let Some(json) = payload_to_json(value) {
                    metadata.extra.insert(key.clone(), json);
                }
            }
            hits.push(VectorHit {
                passage: Passage { content, metadata },
                score: point.score,
            });
        }
        Ok(hits)
    }

    async fn call_with_retry<T, F, Fut>(&self, stage: &'static str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    self.health.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    let message = err.to_string();
                    self.health.record_failure(message.clone());
                    attempts += 1;
                    if attempts > 1 {
                        return Err(err);
                    }
                    warn!(stage = stage, message = "retrying after error", reason = %message);
                }
            }
        }
    }
}

#[async_trait]
impl VectorSearchBackend for QdrantVectorBackend {
    fn dimension(&self) -> usize {
        self.config.dimension as usize
    }

    async fn search_vectors(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<VectorHit>> {
        let shared_vector = Arc::new(vector);
        self.call_with_retry("search", || {
            let vector = shared_vector.clone();
            async move { self.search_points(vector, limit).await }
        })
        .await
    }
}

fn payload_to_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|value| value.kind.as_ref())
        .and_then(|kind| match kind {
            Kind::StringValue(text) => Some(text.clone()),
            _ => None,
        })
}

fn payload_to_i64(value: Option<&Value>) -> Option<i64> {
    value
        .and_then(|value| value.kind.as_ref())
        .and_then(|kind| match kind {
            Kind::IntegerValue(val) => Some(*val),
            _ => None,
        })
}

/// Missing index reads as 0; `Err` carries a stored value outside `u32`
fn chunk_index(value: Option<&Value>) -> std::result::Result<u32, i64> {
    match payload_to_i64(value) {
        None => Ok(0),
        Some(raw) => u32::try_from(raw).map_err(|_| raw),
    }
}

fn payload_to_json(value: &Value) -> Option<serde_json::Value> {
    match value.kind.as_ref()? {
        Kind::StringValue(text) => Some(serde_json::Value::from(text.clone())),
        Kind::IntegerValue(val) => Some(serde_json::Value::from(*val)),
        Kind::DoubleValue(val) => Some(serde_json::Value::from(*val)),
        Kind::BoolValue(val) => Some(serde_json::Value::from(*val)),
        _ => None,
    }
}
