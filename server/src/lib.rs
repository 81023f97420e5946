pub mod expand;
pub mod tools;

use anyhow::Result;
use expand::QueryExpander;
use q2d_core::channel::LineChannel;
use q2d_core::dataset::{load_corpus, load_queries, text_lookup, Document, Query};
use q2d_core::metrics::load_qrels;
use q2d_core::persist::load_index;
use q2d_core::protocol::{decode_request, ProtocolError, Response, READY_LINE};
use q2d_core::{Bm25, Bm25Params, DocId, Index, Qrels};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tools::ToolCall;

/// Everything the tool handlers read. Built once at startup, never mutated.
pub struct ToolContext {
    pub ranker: Bm25,
    pub docs: HashMap<DocId, String>,
    pub corpus: Vec<Document>,
    pub queries: Vec<Query>,
    pub qrels: Qrels,
    pub expander: Option<Box<dyn QueryExpander>>,
}

impl ToolContext {
    pub fn new(ranker: Bm25, corpus: Vec<Document>, queries: Vec<Query>, qrels: Qrels) -> Self {
        let docs = text_lookup(&corpus);
        Self { ranker, docs, corpus, queries, qrels, expander: None }
    }

    pub fn with_expander(mut self, expander: Box<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn load(config: &ServerConfig) -> Result<Self> {
        let index: Index = load_index(&config.index)?;
        let corpus = load_corpus(&config.corpus)?;
        let queries = load_queries(&config.queries)?;
        let qrels = load_qrels(&config.qrels)?;
        tracing::info!(
            num_docs = index.num_docs(),
            corpus = corpus.len(),
            queries = queries.len(),
            qrels = qrels.len(),
            "loaded tool context"
        );
        Ok(Self::new(Bm25::with_params(index, config.params), corpus, queries, qrels))
    }
}

pub struct ServerConfig {
    pub index: PathBuf,
    pub corpus: PathBuf,
    pub queries: PathBuf,
    pub qrels: PathBuf,
    pub params: Bm25Params,
}

/// Answer one request line. Never fails: every problem becomes an error response.
pub async fn handle_line(ctx: &Arc<ToolContext>, line: &str) -> Response {
    let call = match decode_request(line).and_then(ToolCall::from_request) {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!(error = %e, "rejected request");
            return Response::err(e.to_string());
        }
    };
    let name = call.name();
    tracing::debug!(tool = name, "dispatching");

    // run on its own task so a panicking handler turns into an error reply
    let task_ctx = Arc::clone(ctx);
    let outcome = tokio::spawn(async move { tools::dispatch(&task_ctx, call).await }).await;
    match outcome {
        Ok(Ok(result)) => Response::ok(result),
        Ok(Err(e)) => {
            tracing::warn!(tool = name, error = %e, "tool failed");
            Response::err(e.to_string())
        }
        Err(join_err) => {
            tracing::error!(tool = name, error = %join_err, "tool aborted");
            Response::err(format!("tool {name} aborted: {join_err}"))
        }
    }
}

/// Write the handshake line, then answer one line at a time until the input closes.
pub async fn serve<R, W>(ctx: Arc<ToolContext>, channel: &mut LineChannel<R, W>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    channel.send_line(READY_LINE).await?;
    let mut served = 0u64;
    while let Some(raw) = channel.recv_bytes().await? {
        let response = match String::from_utf8(raw) {
            Ok(line) => handle_line(&ctx, &line).await,
            Err(_) => {
                tracing::warn!("rejected request with invalid UTF-8");
                Response::err(ProtocolError::Malformed("invalid UTF-8".into()).to_string())
            }
        };
        channel.send_json(&response).await?;
        served += 1;
    }
    tracing::info!(served, "input closed, stopping");
    Ok(())
}
