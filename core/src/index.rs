use crate::dataset::Document;
use crate::tokenizer::tokenize;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
    #[error("index file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Immutable BM25 index snapshot.
///
/// `doc_ids` and `docs` are parallel: `docs[i]` holds the token sequence of
/// the document whose id is `doc_ids[i]`. Rebuild instead of mutating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub doc_ids: Vec<DocId>,
    pub docs: Vec<Vec<String>>,
    pub idf: BTreeMap<String, f64>,
    pub avgdl: f64,
}

/// BM25 idf with `+1` inside the log, non-negative even for `df == n`.
pub fn idf_weight(n: usize, df: usize) -> f64 {
    let (n, df) = (n as f64, df as f64);
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

impl Index {
    pub fn build(corpus: &[Document]) -> Result<Self, IndexError> {
        if corpus.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        let doc_ids: Vec<DocId> = corpus.iter().map(|d| d.id).collect();
        let docs: Vec<Vec<String>> = corpus.iter().map(|d| tokenize(&d.text)).collect();

        let n = docs.len();
        let total_len: usize = docs.iter().map(Vec::len).sum();
        if total_len == 0 {
            // every document is whitespace only; avgdl would be zero
            return Err(IndexError::EmptyCorpus);
        }
        let avgdl = total_len as f64 / n as f64;

        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in &docs {
            let seen: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }
        let idf: BTreeMap<String, f64> = df
            .into_iter()
            .map(|(term, df_t)| (term.to_string(), idf_weight(n, df_t)))
            .collect();

        tracing::info!(num_docs = n, num_terms = idf.len(), avgdl, "built index");
        Ok(Self { doc_ids, docs, idf, avgdl })
    }

    pub fn num_docs(&self) -> usize { self.docs.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: DocId, text: &str) -> Document {
        Document { id, text: text.to_string() }
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert!(matches!(Index::build(&[]), Err(IndexError::EmptyCorpus)));
        assert!(matches!(Index::build(&[doc(1, "  \n")]), Err(IndexError::EmptyCorpus)));
    }

    #[test]
    fn computes_avgdl_and_df() {
        let idx = Index::build(&[doc(10, "aab"), doc(20, "b c")]).unwrap();
        assert_eq!(idx.doc_ids, vec![10, 20]);
        assert_eq!(idx.docs[1], vec!["b", "c"]);
        assert!((idx.avgdl - 2.5).abs() < 1e-12);
        // "a" appears twice in one doc but df counts it once
        assert!((idx.idf["a"] - idf_weight(2, 1)).abs() < 1e-12);
        assert!((idx.idf["b"] - idf_weight(2, 2)).abs() < 1e-12);
        assert_eq!(idx.idf.len(), 3);
    }

    #[test]
    fn idf_for_ubiquitous_term_is_positive() {
        for n in [1usize, 2, 3, 10, 1000] {
            let w = idf_weight(n, n);
            let expected = (1.0 + 0.5 / (n as f64 + 0.5)).ln();
            assert!(w > 0.0);
            assert!((w - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let idx = Index::build(&[doc(1, "abc"), doc(2, "ab"), doc(3, "a")]).unwrap();
        assert!(idx.idf["c"] > idx.idf["b"]);
        assert!(idx.idf["b"] > idx.idf["a"]);
    }
}
