use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::RetrievalError;

/// Fields every passage consumer relies on, plus opaque per-strategy extras
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub source_id: String,
    pub chunk_index: u32,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PassageMetadata {
    pub fn new(source_id: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            source_id: source_id.into(),
            chunk_index,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A stored chunk of an uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub metadata: PassageMetadata,
}

impl Passage {
    pub fn new(content: impl Into<String>, source_id: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            content: content.into(),
            metadata: PassageMetadata::new(source_id, chunk_index),
        }
    }
}

/// Which adapter produced a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    Dense,
    Sparse,
    Fallback,
    Reranked,
}

impl SourceStrategy {
    /// Fusion priority, lower wins
    pub fn priority(&self) -> u8 {
        match self {
            SourceStrategy::Dense => 0,
            SourceStrategy::Sparse => 1,
            SourceStrategy::Fallback => 2,
            SourceStrategy::Reranked => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStrategy::Dense => "dense",
            SourceStrategy::Sparse => "sparse",
            SourceStrategy::Fallback => "fallback",
            SourceStrategy::Reranked => "reranked",
        }
    }
}

impl fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A passage as returned by retrieval.
///
/// `score` is on the producing strategy's own scale and is not comparable
/// across strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    pub metadata: PassageMetadata,
    pub source_strategy: SourceStrategy,
    pub score: f32,
}

impl RetrievedPassage {
    pub fn from_passage(passage: Passage, source_strategy: SourceStrategy, score: f32) -> Self {
        Self {
            content: passage.content,
            metadata: passage.metadata,
            source_strategy,
            score,
        }
    }
}

/// Strategy requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Dense,
    Sparse,
    Hybrid,
    Rerank,
    Auto,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Dense => "dense",
            SearchStrategy::Sparse => "sparse",
            SearchStrategy::Hybrid => "hybrid",
            SearchStrategy::Rerank => "rerank",
            SearchStrategy::Auto => "auto",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = RetrievalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dense" | "vector" => Ok(SearchStrategy::Dense),
            "sparse" | "bm25" | "lexical" => Ok(SearchStrategy::Sparse),
            "hybrid" => Ok(SearchStrategy::Hybrid),
            "rerank" | "reranked" => Ok(SearchStrategy::Rerank),
            "auto" => Ok(SearchStrategy::Auto),
            other => Err(RetrievalError::InvalidArgument(format!(
                "unknown search strategy '{other}'"
            ))),
        }
    }
}

/// Ordered, content-distinct search result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FusedResultSet {
    passages: Vec<RetrievedPassage>,
}

impl FusedResultSet {
    /// Keep the first passage per distinct content, then cut to `k`
    pub fn from_ordered(passages: impl IntoIterator<Item = RetrievedPassage>, k: usize) -> Self {
        let mut seen = std::collections::HashSet::new();
        let passages = passages
            .into_iter()
            .filter(|passage| seen.insert(passage.content.clone()))
            .take(k)
            .collect();
        Self { passages }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedPassage> {
        self.passages.iter()
    }

    pub fn as_slice(&self) -> &[RetrievedPassage] {
        &self.passages
    }

    pub fn contents(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.content.as_str()).collect()
    }

    pub fn into_passages(self) -> Vec<RetrievedPassage> {
        self.passages
    }
}

impl IntoIterator for FusedResultSet {
    type Item = RetrievedPassage;
    type IntoIter = std::vec::IntoIter<RetrievedPassage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.into_iter()
    }
}
