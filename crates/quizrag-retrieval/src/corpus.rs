//! Persisted passage corpus consumed by the sparse index and the fallback.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{AdapterResult, CorpusError, Passage};

/// Storage collaborator that owns every uploaded passage
#[async_trait]
pub trait PassageCorpus: Send + Sync {
    /// Every stored passage, in storage order
    async fn fetch_all_passages(&self) -> AdapterResult<Vec<Passage>>;

    /// Passages whose content contains `query` (ASCII case-insensitive), in
    /// storage order, at most `limit`
    async fn substring_search(&self, query: &str, limit: usize) -> AdapterResult<Vec<Passage>>;
}

/// Corpus held in memory, optionally snapshotted to a JSON file
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    passages: RwLock<Vec<Passage>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages: RwLock::new(passages),
        }
    }

    pub fn push(&self, passage: Passage) {
        self.passages.write().push(passage);
    }

    pub fn extend(&self, passages: impl IntoIterator<Item = Passage>) {
        self.passages.write().extend(passages);
    }

    /// Drop every passage of one source document, returning how many went
    pub fn remove_source(&self, source_id: &str) -> usize {
        let mut passages = self.passages.write();
        let before = passages.len();
        passages.retain(|p| p.metadata.source_id != source_id);
        before - passages.len()
    }

    pub fn len(&self) -> usize {
        self.passages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.read().is_empty()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CorpusError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &*self.passages.read())?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let reader = BufReader::new(File::open(path)?);
        let passages: Vec<Passage> = serde_json::from_reader(reader)?;
        Ok(Self::from_passages(passages))
    }
}

#[async_trait]
impl PassageCorpus for InMemoryCorpus {
    async fn fetch_all_passages(&self) -> AdapterResult<Vec<Passage>> {
        Ok(self.passages.read().clone())
    }

    async fn substring_search(&self, query: &str, limit: usize) -> AdapterResult<Vec<Passage>> {
        let needle = query.to_ascii_lowercase();
        Ok(self
            .passages
            .read()
            .iter()
            .filter(|p| p.content.to_ascii_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }
}
