//! Cross-encoder reranking.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    AdapterError, AdapterHealth, AdapterHealthStatus, AdapterResult, Reranker, RetrievedPassage,
    SourceStrategy,
};

/// Default number of candidates kept after reranking
pub const DEFAULT_RERANK_TOP_N: usize = 3;

/// Jointly scores `(query, passage)` pairs.
///
/// Returns one relevance score per passage, in input order.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

pub struct CrossEncoderReranker {
    name: String,
    encoder: Option<Arc<dyn CrossEncoder>>,
    top_n: usize,
    health: AdapterHealth,
}

impl CrossEncoderReranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            name: "cross-encoder".to_string(),
            encoder: Some(encoder),
            top_n: DEFAULT_RERANK_TOP_N,
            health: AdapterHealth::default(),
        }
    }

    /// Reranker whose model could not be loaded; logged once, never available
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(adapter = "cross-encoder", reason = %reason, "Reranker disabled");
        let health = AdapterHealth::default();
        health.record_failure(reason);
        Self {
            name: "cross-encoder".to_string(),
            encoder: None,
            top_n: DEFAULT_RERANK_TOP_N,
            health,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n.max(1);
        self
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.encoder.is_some()
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedPassage>,
    ) -> AdapterResult<Vec<RetrievedPassage>> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| AdapterError::misconfigured(&self.name, "no cross-encoder model"))?;
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let scores = encoder.score(query, &texts).map_err(|e| {
            self.health.record_failure(e.to_string());
            AdapterError::unavailable(&self.name, e)
        })?;
        if scores.len() != candidates.len() {
            let error = AdapterError::malformed(
                &self.name,
                format!("{} scores for {} candidates", scores.len(), candidates.len()),
            );
            self.health.record_failure(error.to_string());
            return Err(error);
        }
        self.health.record_success();

        let mut scored: Vec<RetrievedPassage> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut passage, score)| {
                passage.score = score;
                passage.source_strategy = SourceStrategy::Reranked;
                passage
            })
            .collect();
        // sort_by is stable: equal scores keep first-pass order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.top_n);
        debug!(adapter = %self.name, kept = scored.len(), "Reranked candidates");
        Ok(scored)
    }

    fn health(&self) -> AdapterHealthStatus {
        self.health.status(self.is_available())
    }
}

#[cfg(feature = "local-rerank")]
pub use local::FastEmbedCrossEncoder;

#[cfg(feature = "local-rerank")]
mod local {
    use anyhow::Result;
    use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
    use parking_lot::Mutex;

    use super::CrossEncoder;

    /// Cross-encoder running locally through fastembed
    pub struct FastEmbedCrossEncoder {
        model: Mutex<TextRerank>,
    }

    impl FastEmbedCrossEncoder {
        pub fn try_new() -> Result<Self> {
            Self::with_model(RerankerModel::BGERerankerBase)
        }

        pub fn with_model(model: RerankerModel) -> Result<Self> {
            let model = TextRerank::try_new(RerankInitOptions::new(model))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl CrossEncoder for FastEmbedCrossEncoder {
        fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            let results = self.model.lock().rerank(query, passages, false, None)?;
            let mut scores = vec![f32::MIN; passages.len()];
            for result in results {
                if let Some(slot) = scores.get_mut(result.index) {
                    *slot = result.score;
                }
            }
            Ok(scores)
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use tokio::test;

    use super::*;
    use crate::Passage;

    /// Scores by how many times the query occurs in the passage
    struct CountingEncoder;

    impl CrossEncoder for CountingEncoder {
        fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            Ok(passages
                .iter()
                .map(|p| p.matches(query).count() as f32)
                .collect())
        }
    }

    struct BrokenEncoder;

    impl CrossEncoder for BrokenEncoder {
        fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            Err(anyhow!("model not loaded"))
        }
    }

    fn candidates(contents: &[&str]) -> Vec<RetrievedPassage> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                RetrievedPassage::from_passage(Passage::new(*c, "d", i as u32), SourceStrategy::Dense, 0.1)
            })
            .collect()
    }

    #[test]
    async fn orders_by_relevance_and_keeps_top_n() {
        let reranker = CrossEncoderReranker::new(Arc::new(CountingEncoder)).with_top_n(2);
        let out = reranker
            .rerank("x", candidates(&["x", "xxx", "none", "xx"]))
            .await
            .unwrap();
        let contents: Vec<_> = out.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["xxx", "xx"]);
        assert!(out.iter().all(|p| p.source_strategy == SourceStrategy::Reranked));
        assert_eq!(out[0].score, 3.0);
    }

    #[test]
    async fn ties_keep_first_pass_order() {
        let reranker = CrossEncoderReranker::new(Arc::new(CountingEncoder));
        let out = reranker
            .rerank("q", candidates(&["a", "b", "c"]))
            .await
            .unwrap();
        let contents: Vec<_> = out.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    async fn model_failure_is_reported() {
        let reranker = CrossEncoderReranker::new(Arc::new(BrokenEncoder));
        assert!(reranker.rerank("q", candidates(&["a"])).await.is_err());
        assert!(!reranker.health().healthy);

        let missing = CrossEncoderReranker::unavailable("weights not found");
        assert!(!missing.is_available());
        assert!(matches!(
            missing.rerank("q", candidates(&["a"])).await,
            Err(AdapterError::Misconfigured { .. })
        ));
    }
}
