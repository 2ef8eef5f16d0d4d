//! Passage retrieval for the quiz generator.
//!
//! Several independently failing strategies (dense vectors, BM25, a
//! cross-encoder reranker and a substring fallback over the stored corpus)
//! are combined by [`RetrievalOrchestrator`] into one deduplicated, ranked
//! [`FusedResultSet`]. Backend failures shrink results; they never fail a
//! search.

pub mod adapter;
pub mod corpus;
pub mod dense;
pub mod error;
pub mod fallback;
pub mod fusion;
pub mod models;
pub mod orchestrator;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod rerank;
pub mod sparse;

pub use adapter::{AdapterHealth, AdapterHealthStatus, Reranker, RetrieverAdapter};
pub use corpus::{InMemoryCorpus, PassageCorpus};
pub use dense::{DenseRetriever, EmbeddingProvider, InMemoryVectorIndex, VectorHit, VectorSearchBackend};
pub use error::{AdapterError, AdapterResult, CorpusError, IndexError, RetrievalError, RetrievalResult};
pub use fallback::{SubstringRetriever, FALLBACK_SCORE};
pub use fusion::{FusionMethod, RankedList, DEFAULT_RRF_K};
pub use models::{
    FusedResultSet, Passage, PassageMetadata, RetrievedPassage, SearchStrategy, SourceStrategy,
};
pub use orchestrator::{
    ComponentHealth, OrchestratorConfig, RetrievalHealth, RetrievalOrchestrator,
    RetrievalOrchestratorBuilder, SearchRequest,
};
#[cfg(feature = "qdrant")]
pub use qdrant::{QdrantConfig, QdrantVectorBackend};
#[cfg(feature = "local-rerank")]
pub use rerank::FastEmbedCrossEncoder;
pub use rerank::{CrossEncoder, CrossEncoderReranker, DEFAULT_RERANK_TOP_N};
pub use sparse::{SparseIndex, SparseRetriever};
