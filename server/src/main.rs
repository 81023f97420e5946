use anyhow::Result;
use clap::Parser;
use q2d_core::channel::LineChannel;
use q2d_core::dataset::DatasetPaths;
use q2d_core::Bm25Params;
use q2d_server::expand::{GeminiConfig, GeminiExpander, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL};
use q2d_server::{serve, ServerConfig, ToolContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "q2d-server")]
#[command(about = "Serve BM25 search tools over a line-delimited JSON protocol on stdin/stdout")]
struct Args {
    /// Prebuilt index file
    #[arg(long, default_value = "fraud_index.json")]
    index: PathBuf,
    /// Dataset directory containing format/{corpus,queries,qrels}.json
    #[arg(long, default_value = "data/fraud")]
    data_dir: PathBuf,
    /// Override the corpus file
    #[arg(long)]
    corpus: Option<PathBuf>,
    /// Override the queries file
    #[arg(long)]
    queries: Option<PathBuf>,
    /// Override the qrels file
    #[arg(long)]
    qrels: Option<PathBuf>,
    /// BM25 term-frequency saturation
    #[arg(long, default_value_t = 1.5)]
    k1: f64,
    /// BM25 length normalization
    #[arg(long, default_value_t = 0.75)]
    b: f64,
    /// Gemini model used by expand_search (needs GEMINI_API_KEY)
    #[arg(long, default_value = DEFAULT_GEMINI_MODEL)]
    gemini_model: String,
    /// Gemini API base URL
    #[arg(long, default_value = DEFAULT_GEMINI_ENDPOINT)]
    gemini_endpoint: String,
    /// Timeout for one expansion request
    #[arg(long, default_value_t = 20)]
    expand_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let args = Args::parse();

    let paths = DatasetPaths::new(&args.data_dir);
    let config = ServerConfig {
        index: args.index,
        corpus: args.corpus.unwrap_or_else(|| paths.corpus()),
        queries: args.queries.unwrap_or_else(|| paths.queries()),
        qrels: args.qrels.unwrap_or_else(|| paths.qrels()),
        params: Bm25Params { k1: args.k1, b: args.b },
    };
    let mut ctx = ToolContext::load(&config)?;

    let timeout = Duration::from_secs(args.expand_timeout_secs);
    match GeminiConfig::from_env(&args.gemini_model, &args.gemini_endpoint, timeout) {
        Some(gemini) => {
            tracing::info!(model = %gemini.model, "query expansion enabled");
            ctx = ctx.with_expander(Box::new(GeminiExpander::new(gemini)?));
        }
        None => tracing::info!("GEMINI_API_KEY not set, expand_search will report unavailable"),
    }

    let mut channel = LineChannel::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    serve(Arc::new(ctx), &mut channel).await?;
    Ok(())
}
