//! BM25 lexical retrieval built on an in-RAM Tantivy index.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tantivy::{
    collector::TopDocs,
    doc,
    query::QueryParser,
    schema::{Field, Schema, SchemaBuilder, TantivyDocument, Value, STORED, STRING, TEXT},
    Index, IndexReader, IndexWriter,
};
use tracing::{debug, info, warn};

use crate::{
    AdapterError, AdapterHealth, AdapterHealthStatus, AdapterResult, IndexError, Passage,
    PassageCorpus, PassageMetadata, RetrievedPassage, RetrieverAdapter, SourceStrategy,
};

/// Smallest heap Tantivy accepts for a single indexing thread
const WRITER_HEAP_BYTES: usize = 15_000_000;

#[derive(Clone, Copy)]
struct SparseFields {
    content: Field,
    source_id: Field,
    chunk_index: Field,
    extra: Field,
}

impl SparseFields {
    fn schema() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();
        let content = builder.add_text_field("content", TEXT | STORED);
        let source_id = builder.add_text_field("source_id", STRING | STORED);
        let chunk_index = builder.add_u64_field("chunk_index", STORED);
        let extra = builder.add_text_field("extra", STORED);
        (
            builder.build(),
            Self {
                content,
                source_id,
                chunk_index,
                extra,
            },
        )
    }
}

/// Immutable BM25 index over a corpus snapshot
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    fields: SparseFields,
    doc_count: usize,
}

impl SparseIndex {
    /// Index every passage with non-blank content; `None` when nothing qualifies
    pub fn from_passages(passages: &[Passage]) -> Result<Option<Self>, IndexError> {
        let (schema, fields) = SparseFields::schema();
        let index = Index::create_in_ram(schema);
        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;

        let mut doc_count = 0;
        for passage in passages.iter().filter(|p| !p.content.trim().is_empty()) {
            writer.add_document(doc!(
                fields.content => passage.content.clone(),
                fields.source_id => passage.metadata.source_id.clone(),
                fields.chunk_index => u64::from(passage.metadata.chunk_index),
                fields.extra => serde_json::to_string(&passage.metadata.extra)?
            ))?;
            doc_count += 1;
        }
        if doc_count == 0 {
            return Ok(None);
        }

        writer.commit()?;
        let reader = index.reader()?;
        Ok(Some(Self {
            index,
            reader,
            fields,
            doc_count,
        }))
    }

    /// Snapshot the corpus and index it
    pub async fn build(corpus: &dyn PassageCorpus) -> AdapterResult<Option<Self>> {
        let start = Instant::now();
        let passages = corpus.fetch_all_passages().await?;
        let index = Self::from_passages(&passages)
            .map_err(|e| AdapterError::unavailable("sparse", e))?;
        info!(
            passages = passages.len(),
            indexed = index.as_ref().map_or(0, |i| i.doc_count),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sparse index built"
        );
        Ok(index)
    }

    pub fn document_count(&self) -> usize {
        self.doc_count
    }

    /// Best `limit` passages with their BM25 scores
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(f32, Passage)>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.content]);
        // Free text from users routinely contains query syntax characters
        let (parsed, _errors) = parser.parse_query_lenient(query);
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(address)?;
            let content = retrieved
                .get_first(self.fields.content)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .unwrap_or_default();
            let source_id = retrieved
                .get_first(self.fields.source_id)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .unwrap_or_default();
            let chunk_index = retrieved
                .get_first(self.fields.chunk_index)
                .and_then(|value| value.as_u64())
                .unwrap_or_default() as u32;
            let extra = match retrieved
                .get_first(self.fields.extra)
                .and_then(|value| value.as_str())
            {
                Some(raw) => serde_json::from_str(raw)?,
                None => serde_json::Map::new(),
            };
            hits.push((
                score,
                Passage {
                    content,
                    metadata: PassageMetadata {
                        source_id,
                        chunk_index,
                        extra,
                    },
                },
            ));
        }
        Ok(hits)
    }
}

/// Sparse adapter; unavailable until an index with at least one passage exists
pub struct SparseRetriever {
    name: String,
    corpus: Option<Arc<dyn PassageCorpus>>,
    index: RwLock<Option<Arc<SparseIndex>>>,
    health: AdapterHealth,
}

impl SparseRetriever {
    /// Retriever over `corpus`; call [`rebuild`](Self::rebuild) to index it
    pub fn new(corpus: Arc<dyn PassageCorpus>) -> Self {
        Self {
            name: "sparse".to_string(),
            corpus: Some(corpus),
            index: RwLock::new(None),
            health: AdapterHealth::default(),
        }
    }

    /// Retriever over `corpus`, indexed immediately.
    ///
    /// A failed build leaves the adapter unavailable rather than failing.
    pub async fn build(corpus: Arc<dyn PassageCorpus>) -> Self {
        let retriever = Self::new(corpus);
        if let Err(e) = retriever.rebuild().await {
            warn!(adapter = %retriever.name, error = %e, "Sparse index build failed");
        }
        retriever
    }

    /// Retriever over a prebuilt index that cannot be rebuilt
    pub fn from_index(index: SparseIndex) -> Self {
        Self {
            name: "sparse".to_string(),
            corpus: None,
            index: RwLock::new(Some(Arc::new(index))),
            health: AdapterHealth::default(),
        }
    }

    /// Re-read the corpus and swap in a fresh index, returning its size
    pub async fn rebuild(&self) -> AdapterResult<usize> {
        let corpus = self
            .corpus
            .as_ref()
            .ok_or_else(|| AdapterError::misconfigured(&self.name, "no corpus to rebuild from"))?;
        let built = SparseIndex::build(corpus.as_ref()).await.map_err(|e| {
            self.health.record_failure(e.to_string());
            e
        })?;
        let count = built.as_ref().map_or(0, SparseIndex::document_count);
        *self.index.write() = built.map(Arc::new);
        Ok(count)
    }

    pub fn document_count(&self) -> usize {
        self.index
            .read()
            .as_ref()
            .map_or(0, |index| index.document_count())
    }
}

#[async_trait]
impl RetrieverAdapter for SparseRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> SourceStrategy {
        SourceStrategy::Sparse
    }

    fn is_available(&self) -> bool {
        self.index.read().is_some()
    }

    async fn retrieve(&self, query: &str, k: usize) -> AdapterResult<Vec<RetrievedPassage>> {
        let index = self
            .index
            .read()
            .clone()
            .ok_or_else(|| AdapterError::unavailable(&self.name, "index not built"))?;

        let start = Instant::now();
        let hits = index.search(query, k).map_err(|e| {
            self.health.record_failure(e.to_string());
            AdapterError::unavailable(&self.name, e)
        })?;
        self.health.record_success();
        debug!(
            adapter = %self.name,
            hits = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sparse retrieval completed"
        );

        Ok(hits
            .into_iter()
            .map(|(score, passage)| {
                RetrievedPassage::from_passage(passage, SourceStrategy::Sparse, score)
            })
            .collect())
    }

    fn health(&self) -> AdapterHealthStatus {
        self.health.status(self.is_available())
    }
}

#[cfg(test)]
mod tests {
    use tokio::test;

    use super::*;
    use crate::InMemoryCorpus;

    fn passages() -> Vec<Passage> {
        vec![
            Passage::new("Photosynthesis converts light to chemical energy.", "bio", 0),
            Passage::new("Mitochondria produce ATP.", "bio", 1),
            Passage::new("   ", "bio", 2),
            Passage::new("ATP stores chemical energy in cells.", "bio", 3),
        ]
    }

    #[test]
    async fn blank_corpus_builds_no_index() {
        assert!(SparseIndex::from_passages(&[]).unwrap().is_none());
        assert!(SparseIndex::from_passages(&[Passage::new(" ", "d", 0)])
            .unwrap()
            .is_none());
    }

    #[test]
    async fn index_ranks_matching_passages() {
        let index = SparseIndex::from_passages(&passages()).unwrap().unwrap();
        assert_eq!(index.document_count(), 3);

        let hits = index.search("ATP", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(_, p)| p.content.contains("ATP")));
        assert!(hits[0].0 >= hits[1].0);
        assert!(index.search("ATP", 0).unwrap().is_empty());
    }

    #[test]
    async fn query_syntax_is_tolerated() {
        let index = SparseIndex::from_passages(&passages()).unwrap().unwrap();
        let hits = index.search("what is \"ATP (energy", 5).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    async fn metadata_survives_indexing() {
        let mut passage = Passage::new("Krebs cycle runs in the matrix.", "bio", 7);
        passage.metadata.extra.insert("page".into(), serde_json::json!(3));
        let index = SparseIndex::from_passages(&[passage.clone()]).unwrap().unwrap();

        let hits = index.search("krebs", 1).unwrap();
        assert_eq!(hits[0].1, passage);
    }

    #[test]
    async fn retriever_rebuilds_after_uploads() {
        let corpus = Arc::new(InMemoryCorpus::new());
        let retriever = SparseRetriever::build(corpus.clone()).await;
        assert!(!retriever.is_available());
        assert!(retriever.retrieve("ATP", 3).await.is_err());

        corpus.extend(passages());
        assert_eq!(retriever.rebuild().await.unwrap(), 3);
        assert!(retriever.is_available());

        let hits = retriever.retrieve("chemical energy", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_strategy, SourceStrategy::Sparse);
    }

    #[test]
    async fn prebuilt_index_cannot_rebuild() {
        let index = SparseIndex::from_passages(&passages()).unwrap().unwrap();
        let retriever = SparseRetriever::from_index(index);
        assert!(matches!(
            retriever.rebuild().await,
            Err(AdapterError::Misconfigured { .. })
        ));
        assert_eq!(retriever.document_count(), 3);
    }
}
