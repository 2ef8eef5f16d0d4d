//! Merging ranked lists from several adapters.
//!
//! Scores from different strategies live on unrelated scales, so the default
//! policy never compares them: lists are walked in a fixed strategy priority
//! (dense, then sparse, then fallback) and the first occurrence of each
//! distinct content wins.

use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::{FusedResultSet, RetrievedPassage, SourceStrategy};

/// Default constant for reciprocal rank fusion
pub const DEFAULT_RRF_K: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Strategy priority, then first seen
    #[default]
    Priority,
    /// `Σ 1 / (k + rank)` per distinct content; ties broken by priority, then
    /// first seen. Passages carry the fused score.
    ReciprocalRank { k: usize },
}

/// One adapter's output, best first
#[derive(Debug, Clone)]
pub struct RankedList {
    pub strategy: SourceStrategy,
    pub passages: Vec<RetrievedPassage>,
}

impl RankedList {
    pub fn new(strategy: SourceStrategy, passages: Vec<RetrievedPassage>) -> Self {
        Self { strategy, passages }
    }
}

impl FusionMethod {
    pub fn fuse(&self, lists: Vec<RankedList>, k: usize) -> FusedResultSet {
        let mut lists = lists;
        // Stable: lists of equal priority keep their given order
        lists.sort_by_key(|list| list.strategy.priority());
        match self {
            FusionMethod::Priority => priority_fusion(lists, k),
            FusionMethod::ReciprocalRank { k: rrf_k } => reciprocal_rank_fusion(lists, *rrf_k, k),
        }
    }
}

fn priority_fusion(lists: Vec<RankedList>, k: usize) -> FusedResultSet {
    FusedResultSet::from_ordered(lists.into_iter().flat_map(|list| list.passages), k)
}

struct FusedCandidate {
    passage: RetrievedPassage,
    score: f64,
    priority: u8,
    first_seen: usize,
}

fn reciprocal_rank_fusion(lists: Vec<RankedList>, rrf_k: usize, k: usize) -> FusedResultSet {
    let mut by_content: HashMap<String, FusedCandidate> = HashMap::new();
    let mut seen = 0usize;

    for list in lists {
        let priority = list.strategy.priority();
        // Within one list only the best-ranked copy of a content counts
        let mut ranked_here = std::collections::HashSet::new();
        for (rank, passage) in list.passages.into_iter().enumerate() {
            if !ranked_here.insert(passage.content.clone()) {
                continue;
            }
            let contribution = 1.0 / (rrf_k as f64 + rank as f64 + 1.0);
            match by_content.get_mut(&passage.content) {
                Some(candidate) => candidate.score += contribution,
                None => {
                    by_content.insert(
                        passage.content.clone(),
                        FusedCandidate {
                            passage,
                            score: contribution,
                            priority,
                            first_seen: seen,
                        },
                    );
                    seen += 1;
                }
            }
        }
    }

    let mut candidates: Vec<FusedCandidate> = by_content.into_values().collect();
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });

    FusedResultSet::from_ordered(
        candidates.into_iter().map(|candidate| {
            let mut passage = candidate.passage;
            passage.score = candidate.score as f32;
            passage
        }),
        k,
    )
}
