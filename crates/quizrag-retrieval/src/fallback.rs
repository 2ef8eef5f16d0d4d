//! Last-resort substring retrieval over the persisted corpus.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    AdapterHealth, AdapterHealthStatus, AdapterResult, PassageCorpus, RetrievedPassage,
    RetrieverAdapter, SourceStrategy,
};

/// Constant score given to every substring match
pub const FALLBACK_SCORE: f32 = 0.5;

pub struct SubstringRetriever {
    corpus: Arc<dyn PassageCorpus>,
    health: AdapterHealth,
}

impl SubstringRetriever {
    pub fn new(corpus: Arc<dyn PassageCorpus>) -> Self {
        Self {
            corpus,
            health: AdapterHealth::default(),
        }
    }
}

#[async_trait]
impl RetrieverAdapter for SubstringRetriever {
    fn name(&self) -> &str {
        "substring"
    }

    fn strategy(&self) -> SourceStrategy {
        SourceStrategy::Fallback
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn retrieve(&self, query: &str, k: usize) -> AdapterResult<Vec<RetrievedPassage>> {
        match self.corpus.substring_search(query, k).await {
            Ok(passages) => {
                self.health.record_success();
                Ok(passages
                    .into_iter()
                    .map(|p| RetrievedPassage::from_passage(p, SourceStrategy::Fallback, FALLBACK_SCORE))
                    .collect())
            }
            Err(e) => {
                self.health.record_failure(e.to_string());
                Err(e)
            }
        }
    }

    fn health(&self) -> AdapterHealthStatus {
        self.health.status(self.is_available())
    }
}
