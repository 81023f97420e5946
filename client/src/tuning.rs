//! Keyword tuning: try query expansions and keep them only while they help.
//!
//! For each processed query the agent searches the original text, then asks
//! the server to expand the current best query. An expansion is kept when MRR
//! strictly improves (or MRR ties and accuracy improves); the first attempt
//! that does not improve ends the loop.

use crate::{ClientError, ToolClient};
use q2d_core::dataset::Query;
use q2d_core::{compute_scores, DocId, QueryId, Qrels, Scores};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy)]
pub struct TuningOptions {
    pub top_k: i64,
    pub num_queries: usize,
    pub max_iter: usize,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self { top_k: 5, num_queries: 3, max_iter: 3 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub qid: QueryId,
    pub original: String,
    pub tuned: String,
    pub before: Vec<DocId>,
    pub after: Vec<DocId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningReport {
    pub before: Scores,
    pub after: Scores,
    pub queries: Vec<QueryOutcome>,
}

#[derive(Deserialize)]
struct HitRef {
    doc_id: DocId,
}

#[derive(Deserialize)]
struct ExpandedReply {
    expanded_query: String,
    #[serde(default)]
    results: Vec<HitRef>,
}

fn decode<T: serde::de::DeserializeOwned>(v: Value) -> Result<T, ClientError> {
    serde_json::from_value(v).map_err(|e| ClientError::UnexpectedResult(e.to_string()))
}

pub async fn run_search(client: &mut ToolClient, query: &str, top_k: i64) -> Result<Vec<DocId>, ClientError> {
    let result = client.call_result("search", json!({"query": query, "top_k": top_k})).await?;
    let hits: Vec<HitRef> = decode(result)?;
    Ok(hits.into_iter().map(|h| h.doc_id).collect())
}

/// Expand and search. If the server cannot expand, search the query as-is.
pub async fn run_expand_search(
    client: &mut ToolClient,
    query: &str,
    top_k: i64,
) -> Result<(String, Vec<DocId>), ClientError> {
    let resp = client.call_tool("expand_search", json!({"query": query, "top_k": top_k})).await?;
    match resp.into_result() {
        Ok(result) => {
            let reply: ExpandedReply = decode(result)?;
            Ok((reply.expanded_query, reply.results.into_iter().map(|h| h.doc_id).collect()))
        }
        Err(error) => {
            tracing::warn!(%error, "expansion failed, searching the original query");
            let docs = run_search(client, query, top_k).await?;
            Ok((query.to_string(), docs))
        }
    }
}

fn single_query_scores(qid: QueryId, relevant: &BTreeSet<DocId>, docs: &[DocId]) -> Scores {
    let qrels = Qrels::from_pairs(relevant.iter().map(|d| (qid, *d)));
    let preds = HashMap::from([(qid, docs.to_vec())]);
    compute_scores(&qrels, &preds)
}

fn improves(new: Scores, best: Scores) -> bool {
    new.mrr > best.mrr || (new.mrr == best.mrr && new.accuracy > best.accuracy)
}

/// Returns the best query found and its ranking, starting from `initial`.
pub async fn refine_query(
    client: &mut ToolClient,
    qid: QueryId,
    query: &str,
    initial: Vec<DocId>,
    relevant: &BTreeSet<DocId>,
    opts: TuningOptions,
) -> Result<(String, Vec<DocId>), ClientError> {
    let mut best_query = query.to_string();
    let mut docs = initial;
    let mut best = single_query_scores(qid, relevant, &docs);

    for attempt in 0..opts.max_iter {
        let (expanded, new_docs) = run_expand_search(client, &best_query, opts.top_k).await?;
        let scores = single_query_scores(qid, relevant, &new_docs);
        if !improves(scores, best) {
            tracing::debug!(qid, attempt, "expansion did not improve, stopping");
            break;
        }
        tracing::info!(qid, attempt, mrr = scores.mrr, expanded = %expanded, "kept expansion");
        best_query = expanded;
        docs = new_docs;
        best = scores;
    }
    Ok((best_query, docs))
}

pub async fn tune(
    client: &mut ToolClient,
    queries: &[Query],
    qrels: &Qrels,
    opts: TuningOptions,
) -> Result<TuningReport, ClientError> {
    let mut outcomes = Vec::new();
    for q in queries.iter().take(opts.num_queries) {
        let before = run_search(client, &q.text, opts.top_k).await?;
        let (tuned, after) = match qrels.get(q.id) {
            Some(relevant) => refine_query(client, q.id, &q.text, before.clone(), relevant, opts).await?,
            None => (q.text.clone(), before.clone()),
        };
        outcomes.push(QueryOutcome { qid: q.id, original: q.text.clone(), tuned, before, after });
    }

    let subset = qrels.subset(outcomes.iter().map(|o| o.qid));
    let preds_before: HashMap<QueryId, Vec<DocId>> = outcomes.iter().map(|o| (o.qid, o.before.clone())).collect();
    let preds_after: HashMap<QueryId, Vec<DocId>> = outcomes.iter().map(|o| (o.qid, o.after.clone())).collect();
    Ok(TuningReport {
        before: compute_scores(&subset, &preds_before),
        after: compute_scores(&subset, &preds_after),
        queries: outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_rule() {
        let s = |accuracy, mrr| Scores { accuracy, mrr };
        assert!(improves(s(1.0, 1.0), s(1.0, 0.5)));
        assert!(improves(s(1.0, 0.0), s(0.0, 0.0)));
        assert!(!improves(s(1.0, 0.5), s(1.0, 0.5)));
        assert!(!improves(s(1.0, 0.25), s(1.0, 0.5)));
    }

    #[test]
    fn single_query_uses_the_relevant_set() {
        let relevant = BTreeSet::from([7, 9]);
        let s = single_query_scores(1, &relevant, &[3, 9, 7]);
        assert_eq!(s, Scores { accuracy: 1.0, mrr: 0.5 });
        let s = single_query_scores(1, &relevant, &[]);
        assert_eq!(s, Scores { accuracy: 0.0, mrr: 0.0 });
    }
}
