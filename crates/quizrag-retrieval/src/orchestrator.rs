//! Strategy selection, adapter invocation, fusion and reranking.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    AdapterHealthStatus, FusedResultSet, FusionMethod, RankedList, Reranker, RetrievalError,
    RetrievalResult, RetrievedPassage, RetrieverAdapter, SearchStrategy, SourceStrategy,
};

/// A search as issued by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub strategy: SearchStrategy,
    pub k: usize,
    /// First-pass candidate count for reranking
    pub rerank_top_k: Option<usize>,
    /// Give up on adapters that have not answered by then
    #[serde(skip)]
    pub deadline: Option<Duration>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, strategy: SearchStrategy, k: usize) -> Self {
        Self {
            query: query.into(),
            strategy,
            k,
            rerank_top_k: None,
            deadline: None,
        }
    }

    pub fn with_rerank_top_k(mut self, rerank_top_k: usize) -> Self {
        self.rerank_top_k = Some(rerank_top_k);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on one adapter call
    pub adapter_timeout: Duration,
    /// Rerank candidate count when the request does not say
    pub rerank_top_k: usize,
    pub fusion: FusionMethod,
    /// Candidate source for `rerank`: dense, sparse or hybrid
    pub first_pass: SearchStrategy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(15),
            rerank_top_k: 10,
            fusion: FusionMethod::Priority,
            first_pass: SearchStrategy::Hybrid,
        }
    }
}

/// One row of [`RetrievalOrchestrator::health`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// `dense`, `sparse`, `fallback` or `reranker`
    pub component: String,
    pub adapter: Option<String>,
    pub configured: bool,
    pub status: AdapterHealthStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalHealth {
    pub components: Vec<ComponentHealth>,
}

impl RetrievalHealth {
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.component == name)
    }

    /// Whether any first-pass path can currently answer
    pub fn can_serve(&self) -> bool {
        ["dense", "sparse", "fallback"]
            .iter()
            .filter_map(|name| self.component(name))
            .any(|c| c.status.available)
    }
}

/// Runs searches across the injected adapters.
///
/// Holds no state beyond its adapter handles, so it is cheap to rebuild and
/// safe to share.
pub struct RetrievalOrchestrator {
    dense: Option<Arc<dyn RetrieverAdapter>>,
    sparse: Option<Arc<dyn RetrieverAdapter>>,
    fallback: Option<Arc<dyn RetrieverAdapter>>,
    reranker: Option<Arc<dyn Reranker>>,
    config: OrchestratorConfig,
}

impl RetrievalOrchestrator {
    pub fn builder() -> RetrievalOrchestratorBuilder {
        RetrievalOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// `auto` becomes `rerank` when a reranker is available, else `hybrid`
    pub fn resolve_strategy(&self, strategy: SearchStrategy) -> SearchStrategy {
        match strategy {
            SearchStrategy::Auto if self.reranker_available() => SearchStrategy::Rerank,
            SearchStrategy::Auto => SearchStrategy::Hybrid,
            other => other,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        strategy: SearchStrategy,
        k: usize,
        rerank_top_k: Option<usize>,
    ) -> RetrievalResult<FusedResultSet> {
        let mut request = SearchRequest::new(query, strategy, k);
        request.rerank_top_k = rerank_top_k;
        self.search_request(&request).await
    }

    /// Run `request`. Fails only for invalid arguments; backend trouble
    /// shrinks or empties the result instead.
    pub async fn search_request(&self, request: &SearchRequest) -> RetrievalResult<FusedResultSet> {
        if request.k == 0 {
            return Err(RetrievalError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if request.rerank_top_k == Some(0) {
            return Err(RetrievalError::InvalidArgument(
                "rerank_top_k must be a positive integer".to_string(),
            ));
        }

        let start = Instant::now();
        let deadline = request.deadline.map(|d| start + d);
        let strategy = self.resolve_strategy(request.strategy);
        let query = request.query.as_str();
        let k = request.k;

        let results = match strategy {
            SearchStrategy::Dense => self.single(self.dense.as_ref(), query, k, deadline).await,
            SearchStrategy::Sparse => self.single(self.sparse.as_ref(), query, k, deadline).await,
            SearchStrategy::Hybrid | SearchStrategy::Auto => {
                self.hybrid(query, k, deadline).await
            }
            SearchStrategy::Rerank => {
                let candidates = request
                    .rerank_top_k
                    .unwrap_or(self.config.rerank_top_k)
                    .max(k);
                self.rerank(query, k, candidates, deadline).await
            }
        };

        info!(
            requested = %request.strategy,
            resolved = %strategy,
            k,
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(results)
    }

    /// Availability and call history of every configured component
    pub fn health(&self) -> RetrievalHealth {
        let adapter_row = |component: &str, adapter: &Option<Arc<dyn RetrieverAdapter>>| {
            ComponentHealth {
                component: component.to_string(),
                adapter: adapter.as_ref().map(|a| a.name().to_string()),
                configured: adapter.is_some(),
                status: adapter
                    .as_ref()
                    .map(|a| a.health())
                    .unwrap_or_else(|| AdapterHealthStatus::from_availability(false)),
            }
        };

        let reranker = ComponentHealth {
            component: "reranker".to_string(),
            adapter: self.reranker.as_ref().map(|r| r.name().to_string()),
            configured: self.reranker.is_some(),
            status: self
                .reranker
                .as_ref()
                .map(|r| r.health())
                .unwrap_or_else(|| AdapterHealthStatus::from_availability(false)),
        };

        RetrievalHealth {
            components: vec![
                adapter_row("dense", &self.dense),
                adapter_row("sparse", &self.sparse),
                adapter_row("fallback", &self.fallback),
                reranker,
            ],
        }
    }

    fn reranker_available(&self) -> bool {
        self.reranker.as_ref().is_some_and(|r| r.is_available())
    }

    /// Explicit single-strategy search; never falls through to another adapter
    async fn single(
        &self,
        adapter: Option<&Arc<dyn RetrieverAdapter>>,
        query: &str,
        k: usize,
        deadline: Option<Instant>,
    ) -> FusedResultSet {
        match self.invoke(adapter, query, k, deadline).await {
            Some(list) => self.config.fusion.fuse(vec![list], k),
            None => FusedResultSet::empty(),
        }
    }

    async fn hybrid(&self, query: &str, k: usize, deadline: Option<Instant>) -> FusedResultSet {
        let (dense, sparse) = tokio::join!(
            self.invoke(self.dense.as_ref(), query, k, deadline),
            self.invoke(self.sparse.as_ref(), query, k, deadline),
        );

        let lists: Vec<RankedList> = dense.into_iter().chain(sparse).collect();
        if lists.is_empty() {
            debug!("Dense and sparse both failed, using substring fallback");
            return self.single(self.fallback.as_ref(), query, k, deadline).await;
        }
        self.config.fusion.fuse(lists, k)
    }

    async fn rerank(
        &self,
        query: &str,
        k: usize,
        candidates: usize,
        deadline: Option<Instant>,
    ) -> FusedResultSet {
        let first_pass = match self.config.first_pass {
            SearchStrategy::Dense => {
                self.single(self.dense.as_ref(), query, candidates, deadline)
                    .await
            }
            SearchStrategy::Sparse => {
                self.single(self.sparse.as_ref(), query, candidates, deadline)
                    .await
            }
            _ => self.hybrid(query, candidates, deadline).await,
        };
        let truncated = |set: FusedResultSet| FusedResultSet::from_ordered(set, k);

        let Some(reranker) = self.reranker.as_ref().filter(|r| r.is_available()) else {
            return truncated(first_pass);
        };
        if first_pass.is_empty() {
            return first_pass;
        }

        let timeout = self.call_timeout(deadline);
        let outcome =
            tokio::time::timeout(timeout, reranker.rerank(query, first_pass.as_slice().to_vec()))
                .await;
        match outcome {
            Ok(Ok(reranked)) => FusedResultSet::from_ordered(reranked, k),
            Ok(Err(e)) => {
                warn!(adapter = reranker.name(), error = %e, "Reranker failed, keeping first-pass order");
                truncated(first_pass)
            }
            Err(_) => {
                warn!(
                    adapter = reranker.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Reranker timed out, keeping first-pass order"
                );
                truncated(first_pass)
            }
        }
    }

    /// Call one adapter under the timeout; `None` when it is missing,
    /// unavailable, failed or too slow
    async fn invoke(
        &self,
        adapter: Option<&Arc<dyn RetrieverAdapter>>,
        query: &str,
        k: usize,
        deadline: Option<Instant>,
    ) -> Option<RankedList> {
        let adapter = adapter?;
        if !adapter.is_available() {
            debug!(adapter = adapter.name(), "Adapter unavailable, skipping");
            return None;
        }

        let timeout = self.call_timeout(deadline);
        match tokio::time::timeout(timeout, adapter.retrieve(query, k)).await {
            Ok(Ok(passages)) => {
                let strategy = adapter.strategy();
                let passages: Vec<RetrievedPassage> = passages
                    .into_iter()
                    .take(k)
                    .map(|mut passage| {
                        passage.source_strategy = strategy;
                        passage
                    })
                    .collect();
                Some(RankedList::new(strategy, passages))
            }
            Ok(Err(e)) => {
                warn!(adapter = adapter.name(), error = %e, "Adapter failed");
                None
            }
            Err(_) => {
                warn!(
                    adapter = adapter.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Adapter timed out"
                );
                None
            }
        }
    }

    fn call_timeout(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(deadline) => self
                .config
                .adapter_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.config.adapter_timeout,
        }
    }
}

#[derive(Default)]
pub struct RetrievalOrchestratorBuilder {
    dense: Option<Arc<dyn RetrieverAdapter>>,
    sparse: Option<Arc<dyn RetrieverAdapter>>,
    fallback: Option<Arc<dyn RetrieverAdapter>>,
    reranker: Option<Arc<dyn Reranker>>,
    config: OrchestratorConfig,
}

impl RetrievalOrchestratorBuilder {
    pub fn dense(mut self, adapter: Arc<dyn RetrieverAdapter>) -> Self {
        self.dense = Some(adapter);
        self
    }

    pub fn sparse(mut self, adapter: Arc<dyn RetrieverAdapter>) -> Self {
        self.sparse = Some(adapter);
        self
    }

    pub fn fallback(mut self, adapter: Arc<dyn RetrieverAdapter>) -> Self {
        self.fallback = Some(adapter);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fusion(mut self, fusion: FusionMethod) -> Self {
        self.config.fusion = fusion;
        self
    }

    pub fn adapter_timeout(mut self, timeout: Duration) -> Self {
        self.config.adapter_timeout = timeout;
        self
    }

    pub fn build(self) -> RetrievalOrchestrator {
        RetrievalOrchestrator {
            dense: self.dense,
            sparse: self.sparse,
            fallback: self.fallback,
            reranker: self.reranker,
            config: self.config,
        }
    }
}
