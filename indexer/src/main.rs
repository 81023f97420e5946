use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use q2d_core::dataset::{load_corpus, load_queries, read_records_jsonl, DatasetPaths, Document};
use q2d_core::metrics::{load_preds, load_qrels, Prediction};
use q2d_core::persist::{load_index, save_index};
use q2d_core::{compute_scores, Bm25, Index, QueryId};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "q2d-indexer")]
#[command(about = "Build, query and evaluate character-level BM25 indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a corpus JSON/JSONL file, or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index file
        #[arg(long, default_value = "fraud_index.json")]
        output: PathBuf,
    },
    /// Rank documents for one query
    Search {
        #[arg(long, default_value = "fraud_index.json")]
        index: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Run every stored query and report accuracy and MRR
    Evaluate {
        #[arg(long, default_value = "fraud_index.json")]
        index: PathBuf,
        /// Dataset directory containing format/queries.json and format/qrels.json
        #[arg(long, default_value = "data/fraud")]
        data_dir: PathBuf,
        /// Number of documents to retrieve for each query
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Optionally write the ranked doc ids per query as a predictions file
        #[arg(long)]
        preds_out: Option<PathBuf>,
    },
    /// Score a predictions file against qrels
    Score {
        #[arg(long)]
        qrels: PathBuf,
        #[arg(long)]
        preds: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build_index(&input, &output),
        Commands::Search { index, query, top_k } => search(&index, &query, top_k),
        Commands::Evaluate { index, data_dir, top_k, preds_out } => evaluate(&index, &data_dir, top_k, preds_out.as_deref()),
        Commands::Score { qrels, preds } => score(&qrels, &preds),
    }
}

/// JSON or JSONL file that is not one of the dataset's query or qrels files.
fn is_corpus_file(path: &Path) -> bool {
    let json = matches!(path.extension().and_then(|s| s.to_str()), Some("json" | "jsonl"));
    let stem = path.file_stem().and_then(|s| s.to_str());
    json && !matches!(stem, Some("queries" | "qrels"))
}

fn build_index(input: &Path, output: &Path) -> Result<()> {
    let mut files: Vec<PathBuf> = Vec::new();
    let dataset_corpus = DatasetPaths::new(input).corpus();
    if input.is_dir() && dataset_corpus.is_file() {
        // a dataset root: only its corpus file holds documents
        files.push(dataset_corpus);
    } else if input.is_dir() {
        // sorted so document order, and therefore tie-breaking, is reproducible
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && is_corpus_file(p) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }

    let mut corpus: Vec<Document> = Vec::new();
    for file in &files {
        let docs: Vec<Document> = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_records_jsonl(file)?
        } else {
            load_corpus(file)?
        };
        tracing::debug!(file = %file.display(), docs = docs.len(), "read corpus file");
        corpus.extend(docs);
    }

    let index = Index::build(&corpus).with_context(|| format!("building index from {}", input.display()))?;
    save_index(output, &index)?;
    tracing::info!(output = %output.display(), num_docs = index.num_docs(), "index build complete");
    println!("Index saved to {}", output.display());
    Ok(())
}

fn search(index: &Path, query: &str, top_k: usize) -> Result<()> {
    let ranker = Bm25::new(load_index(index)?);
    for hit in ranker.query(query, top_k) {
        println!("doc_id: {}\tscore: {:.4}", hit.doc_id, hit.score);
    }
    Ok(())
}

fn evaluate(index: &Path, data_dir: &Path, top_k: usize, preds_out: Option<&Path>) -> Result<()> {
    let paths = DatasetPaths::new(data_dir);
    let ranker = Bm25::new(load_index(index)?);
    let queries = load_queries(paths.queries())?;
    let qrels = load_qrels(paths.qrels())?;

    let mut preds: Vec<Prediction> = Vec::with_capacity(queries.len());
    for q in &queries {
        let docids = ranker.query(&q.text, top_k).into_iter().map(|h| h.doc_id).collect();
        preds.push(Prediction { qid: q.id, docids });
    }
    if let Some(out) = preds_out {
        let f = File::create(out).with_context(|| format!("creating {}", out.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(f), &preds)?;
    }

    let preds_map: HashMap<QueryId, Vec<i64>> = preds.into_iter().map(|p| (p.qid, p.docids)).collect();
    let scores = compute_scores(&qrels, &preds_map);
    println!("Evaluated {} queries", queries.len());
    println!("Accuracy: {:.4}", scores.accuracy);
    println!("MRR: {:.4}", scores.mrr);

    for q in &queries {
        let top: Vec<i64> = preds_map.get(&q.id).map(|d| d.iter().take(3).copied().collect()).unwrap_or_default();
        let truth: Vec<i64> = qrels.get(q.id).map(|s| s.iter().copied().collect()).unwrap_or_default();
        println!("Q{}: top-3 {:?} | truth {:?}", q.id, top, truth);
    }
    Ok(())
}

fn score(qrels: &Path, preds: &Path) -> Result<()> {
    let scores = compute_scores(&load_qrels(qrels)?, &load_preds(preds)?);
    println!("Accuracy: {:.4}", scores.accuracy);
    println!("MRR: {:.4}", scores.mrr);
    Ok(())
}
