use crate::index::Index;
use crate::tokenizer::{term_frequencies, tokenize};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Added to the BM25 denominator so it can never be zero.
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length-normalization strength.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub score: f64,
    pub doc_id: DocId,
}

/// BM25 ranker over a loaded [`Index`].
///
/// Every query scores every document: there is no postings list, so cost is
/// O(N * |query|). That is the scalability ceiling of this ranker.
pub struct Bm25 {
    index: Index,
    params: Bm25Params,
    freqs: Vec<HashMap<String, u32>>,
}

impl Bm25 {
    pub fn new(index: Index) -> Self {
        Self::with_params(index, Bm25Params::default())
    }

    pub fn with_params(index: Index, params: Bm25Params) -> Self {
        let freqs = index
            .docs
            .iter()
            .map(|doc| {
                term_frequencies(doc)
                    .into_iter()
                    .map(|(t, n)| (t.to_string(), n))
                    .collect::<HashMap<String, u32>>()
            })
            .collect();
        Self { index, params, freqs }
    }

    pub fn index(&self) -> &Index { &self.index }
    pub fn params(&self) -> Bm25Params { self.params }
    pub fn len(&self) -> usize { self.index.docs.len() }
    pub fn is_empty(&self) -> bool { self.index.docs.is_empty() }

    /// Score the document at position `doc_index` (not its id).
    ///
    /// Query tokens are read as a sequence: a repeated token contributes once
    /// per occurrence. Tokens missing from the idf table are skipped.
    /// Returns `None` when `doc_index` is out of range.
    pub fn score(&self, query_tokens: &[String], doc_index: usize) -> Option<f64> {
        let Bm25Params { k1, b } = self.params;
        let tf = self.freqs.get(doc_index)?;
        let dl = self.index.docs.get(doc_index)?.len() as f64;
        let norm = k1 * (1.0 - b + b * dl / self.index.avgdl);
        let mut score = 0.0;
        for w in query_tokens {
            let Some(idf) = self.index.idf.get(w) else { continue };
            let f = tf.get(w).copied().unwrap_or(0) as f64;
            score += idf * f * (k1 + 1.0) / (f + norm + EPSILON);
        }
        Some(score)
    }

    /// Rank all documents for `text` and keep the best `top_k`.
    ///
    /// Equal scores keep corpus order.
    pub fn query(&self, text: &str, top_k: usize) -> Vec<Hit> {
        if top_k == 0 {
            return Vec::new();
        }
        let q_tokens = tokenize(text);
        let mut scored: Vec<Hit> = self
            .index
            .doc_ids
            .iter()
            .enumerate()
            .filter_map(|(i, &doc_id)| Some(Hit { score: self.score(&q_tokens, i)?, doc_id }))
            .collect();
        // sort_by is stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }
}
