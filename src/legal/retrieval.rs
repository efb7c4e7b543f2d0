//! Query reduction and top-k matter retrieval.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::legal::dataset::{MatterDataset, MatterRecord};
use crate::legal::index::{SparseVector, VectorIndex};

/// Keep only the last `tail_tokens` whitespace-delimited tokens of `query`.
/// Only this tail of the question is vectorized.
pub fn reduce_query(query: &str, tail_tokens: usize) -> String {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let start = tokens.len().saturating_sub(tail_tokens);
    tokens[start..].join(" ")
}

/// Rows selected for a query.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub reduced_query: String,
    /// Never empty for a non-empty dataset; no two share an Attorney.
    pub records: Vec<MatterRecord>,
    pub used_fallback: bool,
}

/// Similarity search over the Matter Description column.
#[derive(Debug, Clone)]
pub struct MatterRetriever {
    dataset: Arc<MatterDataset>,
    index: VectorIndex,
    query_tail_tokens: usize,
}

impl MatterRetriever {
    pub fn build(dataset: Arc<MatterDataset>, query_tail_tokens: usize) -> Self {
        let index = VectorIndex::build(dataset.records().iter().map(|r| r.description_text()));
        Self {
            dataset,
            index,
            query_tail_tokens,
        }
    }

    pub fn dataset(&self) -> &MatterDataset {
        &self.dataset
    }

    /// Vector used for `query` after tail reduction.
    pub fn query_vector(&self, query: &str) -> SparseVector {
        let reduced = reduce_query(query, self.query_tail_tokens);
        self.index.vectorizer().transform(&reduced)
    }

    pub fn retrieve(&self, query: &str, k: usize) -> Retrieval {
        let reduced_query = reduce_query(query, self.query_tail_tokens);
        let vector = self.index.vectorizer().transform(&reduced_query);
        let hits = self.index.search(&vector, k);

        let candidates: Vec<&MatterRecord> = hits
            .iter()
            .filter_map(|hit| self.dataset.get(hit.row))
            .collect();
        let records = dedupe_by_attorney(candidates);

        if !records.is_empty() {
            tracing::debug!(
                hits = hits.len(),
                records = records.len(),
                "Retrieved matter rows"
            );
            return Retrieval {
                reduced_query,
                records,
                used_fallback: false,
            };
        }

        let fallback = self
            .dataset
            .first_with_attorney()
            .or_else(|| self.dataset.get(0))
            .cloned();
        tracing::debug!(
            found = fallback.is_some(),
            "No similar matters; using default row"
        );
        Retrieval {
            reduced_query,
            records: fallback.into_iter().collect(),
            used_fallback: true,
        }
    }
}

/// Keep the first row per Attorney. Rows without an Attorney share one key.
pub fn dedupe_by_attorney<'a, I>(records: I) -> Vec<MatterRecord>
where
    I: IntoIterator<Item = &'a MatterRecord>,
{
    let mut seen: HashSet<Option<&'a str>> = HashSet::new();
    let mut kept = Vec::new();
    for record in records {
        if seen.insert(record.attorney.as_deref()) {
            kept.push(record.clone());
        }
    }
    kept
}
