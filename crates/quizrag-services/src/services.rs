//! The service container handed to request handlers

use std::{sync::Arc, time::Duration};

use quizrag_cache::{BatchEntry, CacheClass, CacheDiagnostics, CacheGateway, CacheHealth, CacheStats};
use quizrag_config::{AppConfig, ConfigManager, ConfigManagerTrait};
use quizrag_retrieval::{
    CrossEncoder, CrossEncoderReranker, DenseRetriever, EmbeddingProvider, FusedResultSet,
    PassageCorpus, RetrievalHealth, RetrievalOrchestrator, RetrievalResult, SearchRequest,
    SearchStrategy, SparseRetriever, SubstringRetriever, VectorSearchBackend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{wiring, ServiceResult};

/// External models and stores the retrieval adapters are built on.
///
/// Anything left `None` produces an adapter that reports itself unavailable.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub embeddings: Option<Arc<dyn EmbeddingProvider>>,
    pub vectors: Option<Arc<dyn VectorSearchBackend>>,
    pub cross_encoder: Option<Arc<dyn CrossEncoder>>,
    pub corpus: Option<Arc<dyn PassageCorpus>>,
}

impl Collaborators {
    pub fn with_dense(
        mut self,
        embeddings: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorSearchBackend>,
    ) -> Self {
        self.embeddings = Some(embeddings);
        self.vectors = Some(vectors);
        self
    }

    pub fn with_cross_encoder(mut self, encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(encoder);
        self
    }

    pub fn with_corpus(mut self, corpus: Arc<dyn PassageCorpus>) -> Self {
        self.corpus = Some(corpus);
        self
    }
}

/// Outcome of [`QuizRagServices::cached_search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSearch {
    pub results: FusedResultSet,
    /// True when the results came from the cache
    pub cached: bool,
}

/// Explicitly constructed owner of the cache gateway and the orchestrator
pub struct QuizRagServices {
    gateway: Arc<CacheGateway>,
    orchestrator: Arc<RetrievalOrchestrator>,
    sparse: Option<Arc<SparseRetriever>>,
    default_k: usize,
}

impl QuizRagServices {
    pub fn new(gateway: Arc<CacheGateway>, orchestrator: Arc<RetrievalOrchestrator>) -> Self {
        Self {
            gateway,
            orchestrator,
            sparse: None,
            default_k: 5,
        }
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    /// Validate `config`, then build the stores, adapters and orchestrator
    pub async fn from_config(config: &AppConfig, collaborators: Collaborators) -> ServiceResult<Self> {
        ConfigManager::default().validate_config(config)?;

        let gateway = wiring::build_gateway(&config.cache);
        if gateway.is_enabled() && !gateway.connect().await {
            warn!("Cache store unreachable at startup; serving without cache until it recovers");
        }

        let settings = &config.retrieval;
        let mut builder = RetrievalOrchestrator::builder().config(wiring::orchestrator_config(settings));

        let dense = match (collaborators.embeddings, collaborators.vectors) {
            (Some(embeddings), Some(vectors)) => DenseRetriever::new(embeddings, vectors),
            (None, _) => DenseRetriever::misconfigured("no embedding provider configured"),
            (_, None) => DenseRetriever::misconfigured("no vector backend configured"),
        };
        builder = builder.dense(Arc::new(dense));

        let mut sparse = None;
        match collaborators.corpus {
            Some(corpus) => {
                let retriever = Arc::new(SparseRetriever::build(corpus.clone()).await);
                builder = builder
                    .sparse(retriever.clone())
                    .fallback(Arc::new(SubstringRetriever::new(corpus)));
                sparse = Some(retriever);
            }
            None => warn!("No passage corpus configured; sparse and fallback search disabled"),
        }

        let reranker = match collaborators.cross_encoder {
            Some(encoder) => CrossEncoderReranker::new(encoder),
            None => CrossEncoderReranker::unavailable("no cross-encoder configured"),
        };
        builder = builder.reranker(Arc::new(reranker.with_top_n(settings.rerank_top_n)));

        info!(
            cache_enabled = gateway.is_enabled(),
            namespace = %config.cache.namespace,
            fusion = ?settings.fusion,
            "Quiz retrieval services ready"
        );

        Ok(Self {
            gateway: Arc::new(gateway),
            orchestrator: Arc::new(builder.build()),
            sparse,
            default_k: settings.default_k,
        })
    }

    pub fn gateway(&self) -> &Arc<CacheGateway> {
        &self.gateway
    }

    pub fn orchestrator(&self) -> &Arc<RetrievalOrchestrator> {
        &self.orchestrator
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub async fn search(
        &self,
        query: &str,
        strategy: SearchStrategy,
        k: usize,
        rerank_top_k: Option<usize>,
    ) -> RetrievalResult<FusedResultSet> {
        self.orchestrator.search(query, strategy, k, rerank_top_k).await
    }

    /// Search with the configured default `k`
    pub async fn search_default(&self, query: &str, strategy: SearchStrategy) -> RetrievalResult<FusedResultSet> {
        self.search(query, strategy, self.default_k, None).await
    }

    /// Serve `request` from the `search_results` cache when possible,
    /// otherwise search and cache non-empty results.
    pub async fn cached_search(&self, request: &SearchRequest) -> RetrievalResult<CachedSearch> {
        if request.k == 0 || request.rerank_top_k == Some(0) {
            // rejected before any cache traffic
            let results = self.orchestrator.search_request(request).await?;
            return Ok(CachedSearch {
                results,
                cached: false,
            });
        }

        let identifier = search_identifier(request);
        if let Some(results) = self
            .gateway
            .get::<FusedResultSet>(CacheClass::SearchResults, &identifier)
            .await
        {
            debug!(identifier = %identifier, results = results.len(), "Search served from cache");
            return Ok(CachedSearch {
                results,
                cached: true,
            });
        }

        let results = self.orchestrator.search_request(request).await?;
        if !results.is_empty()
            && !self
                .gateway
                .set(CacheClass::SearchResults, &identifier, &results, None)
                .await
        {
            debug!(identifier = %identifier, "Search results not cached");
        }
        Ok(CachedSearch {
            results,
            cached: false,
        })
    }

    pub async fn cache_get<T: DeserializeOwned>(&self, class: CacheClass, identifier: &str) -> Option<T> {
        self.gateway.get(class, identifier).await
    }

    pub async fn cache_set<T: Serialize + ?Sized>(
        &self,
        class: CacheClass,
        identifier: &str,
        payload: &T,
        ttl: Option<Duration>,
    ) -> bool {
        self.gateway.set(class, identifier, payload, ttl).await
    }

    pub async fn cache_set_batch(&self, entries: Vec<BatchEntry>, ttl: Option<Duration>) -> usize {
        self.gateway.set_batch(entries, ttl).await
    }

    pub async fn cache_invalidate(&self, pattern: Option<&str>) -> usize {
        self.gateway.invalidate(pattern).await
    }

    pub async fn cache_health(&self) -> CacheHealth {
        self.gateway.health().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.gateway.stats().await
    }

    pub async fn cache_diagnose(&self) -> CacheDiagnostics {
        self.gateway.diagnose().await
    }

    pub fn retrieval_health(&self) -> RetrievalHealth {
        self.orchestrator.health()
    }

    /// Re-index the corpus after new material arrives and drop cached
    /// search results that no longer reflect it. Returns the indexed count.
    pub async fn refresh_corpus(&self) -> usize {
        let Some(sparse) = &self.sparse else {
            return 0;
        };
        let count = match sparse.rebuild().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Sparse index rebuild failed");
                sparse.document_count()
            }
        };
        let dropped = self
            .gateway
            .invalidate(Some(CacheClass::SearchResults.as_str()))
            .await;
        info!(passages = count, dropped_results = dropped, "Corpus refreshed");
        count
    }
}

/// `search_results` cache identifier for `request`
pub fn search_identifier(request: &SearchRequest) -> String {
    format!("{}:{}:{}", request.query, request.strategy, request.k)
}
