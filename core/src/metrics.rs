//! Retrieval quality metrics: accuracy@K and mean reciprocal rank.
//!
//! Ground truth is a set of relevant documents per query. The bundled
//! datasets have exactly one per query, which is the one-element case.

use crate::dataset::{read_json, DatasetError};
use crate::{DocId, QueryId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Qrels {
    relevant: BTreeMap<QueryId, BTreeSet<DocId>>,
}

impl Qrels {
    pub fn new() -> Self { Self::default() }

    /// Build from `(qid, docid)` pairs; repeated qids accumulate.
    pub fn from_pairs<I: IntoIterator<Item = (QueryId, DocId)>>(pairs: I) -> Self {
        let mut q = Self::new();
        for (qid, doc) in pairs {
            q.insert(qid, doc);
        }
        q
    }

    pub fn insert(&mut self, qid: QueryId, doc: DocId) {
        self.relevant.entry(qid).or_default().insert(doc);
    }

    pub fn get(&self, qid: QueryId) -> Option<&BTreeSet<DocId>> { self.relevant.get(&qid) }
    pub fn contains(&self, qid: QueryId) -> bool { self.relevant.contains_key(&qid) }
    pub fn len(&self) -> usize { self.relevant.len() }
    pub fn is_empty(&self) -> bool { self.relevant.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (QueryId, &BTreeSet<DocId>)> {
        self.relevant.iter().map(|(q, d)| (*q, d))
    }

    /// Keep only the listed queries.
    pub fn subset<I: IntoIterator<Item = QueryId>>(&self, qids: I) -> Self {
        let mut out = Self::new();
        for qid in qids {
            if let Some(docs) = self.relevant.get(&qid) {
                out.relevant.insert(qid, docs.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub accuracy: f64,
    pub mrr: f64,
}

pub fn compute_scores(qrels: &Qrels, preds: &HashMap<QueryId, Vec<DocId>>) -> Scores {
    let total = qrels.len();
    if total == 0 {
        return Scores { accuracy: 0.0, mrr: 0.0 };
    }
    let mut hits = 0usize;
    let mut rr_sum = 0.0;
    for (qid, relevant) in qrels.iter() {
        let Some(ranking) = preds.get(&qid) else { continue };
        if let Some(pos) = ranking.iter().position(|d| relevant.contains(d)) {
            hits += 1;
            rr_sum += 1.0 / (pos + 1) as f64;
        }
    }
    Scores { accuracy: hits as f64 / total as f64, mrr: rr_sum / total as f64 }
}

#[derive(Deserialize)]
struct QrelEntry {
    qid: QueryId,
    docid: DocId,
}

/// One line of a predictions file: the ranked doc ids for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub qid: QueryId,
    pub docids: Vec<DocId>,
}

pub fn load_qrels<P: AsRef<Path>>(path: P) -> Result<Qrels, DatasetError> {
    let entries: Vec<QrelEntry> = read_json(path)?;
    Ok(Qrels::from_pairs(entries.into_iter().map(|e| (e.qid, e.docid))))
}

pub fn load_preds<P: AsRef<Path>>(path: P) -> Result<HashMap<QueryId, Vec<DocId>>, DatasetError> {
    let entries: Vec<Prediction> = read_json(path)?;
    Ok(entries.into_iter().map(|p| (p.qid, p.docids)).collect())
}
