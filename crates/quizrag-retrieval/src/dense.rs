//! Dense (embedding similarity) retrieval.

use std::{cmp::Ordering, sync::Arc, time::Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    AdapterError, AdapterHealth, AdapterHealthStatus, AdapterResult, Passage, RetrievedPassage,
    RetrieverAdapter, SourceStrategy,
};

pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub passage: Passage,
    pub score: f32,
}

#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    fn dimension(&self) -> usize;
    async fn search_vectors(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<VectorHit>>;
}

/// Brute-force cosine index for local runs and tests
pub struct InMemoryVectorIndex {
    dimension: usize,
    entries: RwLock<Vec<(Vec<f32>, Passage)>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, vector: Vec<f32>, passage: Passage) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(anyhow!(
                "vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            ));
        }
        self.entries.write().push((vector, passage));
        Ok(())
    }

    /// Embed and insert every passage
    pub fn index_passages(
        &self,
        embeddings: &dyn EmbeddingProvider,
        passages: impl IntoIterator<Item = Passage>,
    ) -> Result<usize> {
        let mut indexed = 0;
        for passage in passages {
            let vector = embeddings.embed_text(&passage.content)?;
            self.insert(vector, passage)?;
            indexed += 1;
        }
        Ok(indexed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorSearchBackend for InMemoryVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn search_vectors(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<VectorHit>> {
        let entries = self.entries.read();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .map(|(stored, passage)| VectorHit {
                passage: passage.clone(),
                score: cosine(&vector, stored),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

enum DenseState {
    Ready {
        embeddings: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn VectorSearchBackend>,
    },
    Misconfigured {
        reason: String,
    },
}

/// Dense adapter: embed the query, ask the vector backend for neighbours
pub struct DenseRetriever {
    name: String,
    state: DenseState,
    health: AdapterHealth,
}

impl DenseRetriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn VectorSearchBackend>,
    ) -> Self {
        let name = "dense".to_string();
        if embeddings.dimension() == 0 {
            return Self::misconfigured("embedding provider dimension is zero");
        }
        if embeddings.dimension() != backend.dimension() {
            return Self::misconfigured(format!(
                "embedding dimension {} does not match vector backend dimension {}",
                embeddings.dimension(),
                backend.dimension()
            ));
        }
        Self {
            name,
            state: DenseState::Ready {
                embeddings,
                backend,
            },
            health: AdapterHealth::default(),
        }
    }

    /// Adapter that is permanently unavailable; the reason is logged once here.
    pub fn misconfigured(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(adapter = "dense", reason = %reason, "Dense retriever disabled");
        let health = AdapterHealth::default();
        health.record_failure(reason.clone());
        Self {
            name: "dense".to_string(),
            state: DenseState::Misconfigured { reason },
            health,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl RetrieverAdapter for DenseRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> SourceStrategy {
        SourceStrategy::Dense
    }

    fn is_available(&self) -> bool {
        matches!(self.state, DenseState::Ready { .. })
    }

    async fn retrieve(&self, query: &str, k: usize) -> AdapterResult<Vec<RetrievedPassage>> {
        let (embeddings, backend) = match &self.state {
            DenseState::Ready {
                embeddings,
                backend,
            } => (embeddings, backend),
            DenseState::Misconfigured { reason } => {
                return Err(AdapterError::misconfigured(&self.name, reason));
            }
        };

        let start = Instant::now();
        let vector = embeddings.embed_text(query).map_err(|e| {
            self.health.record_failure(e.to_string());
            AdapterError::unavailable(&self.name, e)
        })?;
        if vector.len() != backend.dimension() {
            let error = AdapterError::malformed(
                &self.name,
                format!("embedding has dimension {}", vector.len()),
            );
            self.health.record_failure(error.to_string());
            return Err(error);
        }

        let hits = backend.search_vectors(vector, k).await.map_err(|e| {
            self.health.record_failure(e.to_string());
            AdapterError::unavailable(&self.name, e)
        })?;
        self.health.record_success();
        debug!(
            adapter = %self.name,
            hits = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dense retrieval completed"
        );

        Ok(hits
            .into_iter()
            .take(k)
            .map(|hit| RetrievedPassage::from_passage(hit.passage, SourceStrategy::Dense, hit.score))
            .collect())
    }

    fn health(&self) -> AdapterHealthStatus {
        self.health.status(self.is_available())
    }
}
