use std::{sync::Arc, time::Duration};

use quizrag_cache::{CacheClass, CacheGateway, MemoryStore};
use quizrag_config::{AppConfig, CacheBackend};
use quizrag_retrieval::{
    InMemoryCorpus, Passage, RetrievalError, RetrievalOrchestrator, SearchRequest,
    SearchStrategy, SourceStrategy, SparseRetriever, SubstringRetriever,
};
use quizrag_services::{search_identifier, Collaborators, QuizRagServices};
use tempfile::TempDir;

fn biology_corpus() -> Arc<InMemoryCorpus> {
    Arc::new(InMemoryCorpus::from_passages(vec![
        Passage::new("Photosynthesis converts light to chemical energy.", "bio", 0),
        Passage::new("Mitochondria produce ATP.", "bio", 1),
        Passage::new("Ribosomes assemble proteins.", "bio", 2),
    ]))
}

async fn services_over(store: Arc<MemoryStore>, corpus: Arc<InMemoryCorpus>) -> QuizRagServices {
    let gateway = CacheGateway::builder()
        .store(store)
        .health_check_interval(Duration::ZERO)
        .build();
    let orchestrator = RetrievalOrchestrator::builder()
        .sparse(Arc::new(SparseRetriever::build(corpus.clone()).await))
        .fallback(Arc::new(SubstringRetriever::new(corpus)))
        .build();
    QuizRagServices::new(Arc::new(gateway), Arc::new(orchestrator))
}

#[tokio::test]
async fn second_identical_search_is_served_from_cache() {
    let store = Arc::new(MemoryStore::new());
    let services = services_over(store.clone(), biology_corpus()).await;
    let request = SearchRequest::new("ATP", SearchStrategy::Sparse, 3);

    let first = services.cached_search(&request).await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.results.contents(), vec!["Mitochondria produce ATP."]);

    let second = services.cached_search(&request).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.results, first.results);

    let cached: Option<quizrag_retrieval::FusedResultSet> = services
        .cache_get(CacheClass::SearchResults, &search_identifier(&request))
        .await;
    assert!(cached.is_some());

    let stats = services.cache_stats().await;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn empty_results_are_not_cached() {
    let store = Arc::new(MemoryStore::new());
    let services = services_over(store.clone(), biology_corpus()).await;
    let request = SearchRequest::new("quantum chromodynamics", SearchStrategy::Hybrid, 3);

    let first = services.cached_search(&request).await.unwrap();
    assert!(first.results.is_empty());
    assert!(store.is_empty().await);

    let second = services.cached_search(&request).await.unwrap();
    assert!(!second.cached);
}

#[tokio::test]
async fn cache_outage_still_returns_fresh_results() {
    let store = Arc::new(MemoryStore::new());
    let services = services_over(store.clone(), biology_corpus()).await;
    store.set_online(false);

    let request = SearchRequest::new("ribosomes", SearchStrategy::Sparse, 2);
    let outcome = services.cached_search(&request).await.unwrap();
    assert!(!outcome.cached);
    assert_eq!(outcome.results.contents(), vec!["Ribosomes assemble proteins."]);

    let health = services.cache_health().await;
    assert!(!health.connected);

    store.set_online(true);
    let again = services.cached_search(&request).await.unwrap();
    assert!(!again.cached);
    assert!(services.cached_search(&request).await.unwrap().cached);
}

#[tokio::test]
async fn invalid_k_never_touches_the_cache() {
    let store = Arc::new(MemoryStore::new());
    let services = services_over(store, biology_corpus()).await;

    let request = SearchRequest::new("ATP", SearchStrategy::Sparse, 0);
    let err = services.cached_search(&request).await.unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidArgument(_)));
    assert_eq!(services.cache_stats().await.operations, 0);
}

#[tokio::test]
async fn refresh_corpus_indexes_uploads_and_drops_stale_results() {
    let corpus = biology_corpus();
    let services = QuizRagServices::from_config(
        &AppConfig::default(),
        Collaborators::default().with_corpus(corpus.clone()),
    )
    .await
    .unwrap();

    let request = SearchRequest::new("chloroplast", SearchStrategy::Sparse, 3);
    assert!(services.cached_search(&request).await.unwrap().results.is_empty());

    let warm = SearchRequest::new("ATP", SearchStrategy::Sparse, 3);
    services.cached_search(&warm).await.unwrap();
    assert!(services.cached_search(&warm).await.unwrap().cached);

    corpus.push(Passage::new("The chloroplast hosts photosynthesis.", "bio", 3));
    assert_eq!(services.refresh_corpus().await, 4);

    let found = services.cached_search(&request).await.unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.results.as_slice()[0].source_strategy, SourceStrategy::Sparse);
    assert!(!services.cached_search(&warm).await.unwrap().cached);
}

#[tokio::test]
async fn disk_backed_services_persist_search_results() {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.cache.backend = CacheBackend::Disk;
    config.cache.disk_path = Some(dir.path().to_path_buf());

    let services = QuizRagServices::from_config(
        &config,
        Collaborators::default().with_corpus(biology_corpus()),
    )
    .await
    .unwrap();
    assert!(services.gateway().is_enabled());

    let request = SearchRequest::new("proteins", SearchStrategy::Hybrid, 2);
    let first = services.cached_search(&request).await.unwrap();
    assert_eq!(first.results.len(), 1);

    let written = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(written >= 1);
    assert!(services.cached_search(&request).await.unwrap().cached);

    let diagnostics = services.cache_diagnose().await;
    assert!(diagnostics.operations_working);
}
