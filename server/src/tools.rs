//! The closed set of tools the server answers, and their handlers.

use crate::ToolContext;
use q2d_core::dataset::page;
use q2d_core::protocol::{ProtocolError, Request};
use q2d_core::{compute_scores, DocId, QueryId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn default_top_k() -> i64 { 5 }
fn default_eval_top_k() -> i64 { 10 }

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageArgs {
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluateArgs {
    #[serde(default = "default_eval_top_k")]
    pub top_k: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Test,
    Search(SearchArgs),
    ExpandSearch(SearchArgs),
    ReadFraudData(PageArgs),
    ReadFraudQueries(PageArgs),
    EvaluateFraud(EvaluateArgs),
}

impl ToolCall {
    pub const NAMES: [&'static str; 6] = [
        "test",
        "search",
        "expand_search",
        "read_fraud_data",
        "read_fraud_queries",
        "evaluate_fraud",
    ];

    pub fn from_request(req: Request) -> Result<Self, ProtocolError> {
        let Request { tool, args } = req;
        let call = match tool.as_str() {
            "test" => {
                let NoArgs {} = parse_args(&tool, args)?;
                ToolCall::Test
            }
            "search" => ToolCall::Search(parse_args(&tool, args)?),
            "expand_search" => ToolCall::ExpandSearch(parse_args(&tool, args)?),
            "read_fraud_data" => ToolCall::ReadFraudData(parse_args(&tool, args)?),
            "read_fraud_queries" => ToolCall::ReadFraudQueries(parse_args(&tool, args)?),
            "evaluate_fraud" => ToolCall::EvaluateFraud(parse_args(&tool, args)?),
            _ => return Err(ProtocolError::UnknownTool(tool.clone())),
        };
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Test => "test",
            ToolCall::Search(_) => "search",
            ToolCall::ExpandSearch(_) => "expand_search",
            ToolCall::ReadFraudData(_) => "read_fraud_data",
            ToolCall::ReadFraudQueries(_) => "read_fraud_queries",
            ToolCall::EvaluateFraud(_) => "evaluate_fraud",
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Map<String, Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ProtocolError::InvalidArgs { tool: tool.to_string(), reason: e.to_string() })
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("query expansion unavailable: {0}")]
    ExpansionUnavailable(String),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedSearch {
    pub expanded_query: String,
    pub results: Vec<SearchHit>,
}

/// Negative counts behave like zero.
fn clamp_top_k(top_k: i64) -> usize {
    usize::try_from(top_k).unwrap_or(0)
}

pub fn search(ctx: &ToolContext, query: &str, top_k: i64) -> Vec<SearchHit> {
    ctx.ranker
        .query(query, clamp_top_k(top_k))
        .into_iter()
        .map(|h| SearchHit {
            doc_id: h.doc_id,
            score: h.score,
            text: ctx.docs.get(&h.doc_id).cloned().unwrap_or_default(),
        })
        .collect()
}

pub async fn expand_search(ctx: &ToolContext, query: &str, top_k: i64) -> Result<ExpandedSearch, ToolError> {
    let expander = ctx
        .expander
        .as_deref()
        .ok_or_else(|| ToolError::ExpansionUnavailable("no query expander configured".into()))?;
    let expanded_query = expander
        .expand(query)
        .await
        .map_err(|e| ToolError::ExpansionUnavailable(e.to_string()))?;
    let results = search(ctx, &expanded_query, top_k);
    Ok(ExpandedSearch { expanded_query, results })
}

pub fn evaluate(ctx: &ToolContext, top_k: i64) -> q2d_core::Scores {
    let k = clamp_top_k(top_k);
    let preds: HashMap<QueryId, Vec<DocId>> = ctx
        .queries
        .iter()
        .map(|q| (q.id, ctx.ranker.query(&q.text, k).into_iter().map(|h| h.doc_id).collect()))
        .collect();
    compute_scores(&ctx.qrels, &preds)
}

pub async fn dispatch(ctx: &ToolContext, call: ToolCall) -> Result<Value, ToolError> {
    let value = match call {
        ToolCall::Test => Value::String("Q2D search server is running".into()),
        ToolCall::Search(a) => serde_json::to_value(search(ctx, &a.query, a.top_k))?,
        ToolCall::ExpandSearch(a) => serde_json::to_value(expand_search(ctx, &a.query, a.top_k).await?)?,
        ToolCall::ReadFraudData(p) => serde_json::to_value(page(&ctx.corpus, p.offset, p.limit))?,
        ToolCall::ReadFraudQueries(p) => serde_json::to_value(page(&ctx.queries, p.offset, p.limit))?,
        ToolCall::EvaluateFraud(a) => serde_json::to_value(evaluate(ctx, a.top_k))?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(tool: &str, args: Value) -> Request {
        Request::new(tool, args)
    }

    #[test]
    fn decodes_with_defaults() {
        assert_eq!(
            ToolCall::from_request(req("search", json!({"query": "詐欺"}))).unwrap(),
            ToolCall::Search(SearchArgs { query: "詐欺".into(), top_k: 5 })
        );
        assert_eq!(
            ToolCall::from_request(req("evaluate_fraud", json!({}))).unwrap(),
            ToolCall::EvaluateFraud(EvaluateArgs { top_k: 10 })
        );
        assert_eq!(
            ToolCall::from_request(req("read_fraud_data", json!({"limit": null}))).unwrap(),
            ToolCall::ReadFraudData(PageArgs { offset: 0, limit: None })
        );
        assert_eq!(ToolCall::from_request(req("test", json!({}))).unwrap(), ToolCall::Test);
    }

    #[test]
    fn unknown_and_invalid() {
        let err = ToolCall::from_request(req("nope", json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: nope");

        for (tool, args) in [
            ("search", json!({})),
            ("search", json!({"query": 3})),
            ("search", json!({"query": "a", "extra": 1})),
            ("test", json!({"x": 1})),
            ("read_fraud_queries", json!({"offset": "1"})),
        ] {
            assert!(
                matches!(ToolCall::from_request(req(tool, args.clone())), Err(ProtocolError::InvalidArgs { .. })),
                "{tool} {args}"
            );
        }
    }

    #[test]
    fn names_round_trip() {
        for name in ToolCall::NAMES {
            let args = match name {
                "search" | "expand_search" => json!({"query": "q"}),
                _ => json!({}),
            };
            assert_eq!(ToolCall::from_request(req(name, args)).unwrap().name(), name);
        }
    }

    #[test]
    fn negative_top_k_is_zero() {
        assert_eq!(clamp_top_k(-4), 0);
        assert_eq!(clamp_top_k(7), 7);
    }
}
