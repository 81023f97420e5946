use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use q2d_client::tuning::{tune, TuningOptions};
use q2d_client::{ServerCommand, ToolClient};
use q2d_core::dataset::{load_queries, DatasetPaths};
use q2d_core::metrics::load_qrels;
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "q2d-client")]
#[command(about = "Drive a q2d-server child process over stdio")]
struct Cli {
    /// Server executable
    #[arg(long, default_value = "q2d-server")]
    server: String,
    /// Extra argument passed to the server (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call one tool and print its response
    Call {
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run the keyword tuning agent over the first few queries
    Tune {
        #[arg(long, default_value = "data/fraud")]
        data_dir: PathBuf,
        #[arg(long, default_value_t = 3)]
        num_queries: usize,
        #[arg(long, default_value_t = 5)]
        top_k: i64,
        #[arg(long, default_value_t = 3)]
        max_iter: usize,
    },
}

async fn run(client: &mut ToolClient, command: Commands) -> Result<()> {
    client.start().await?;
    match command {
        Commands::Call { tool, args } => {
            let args: Value = serde_json::from_str(&args).context("--args is not valid JSON")?;
            let resp = client.call_tool(&tool, args).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Tune { data_dir, num_queries, top_k, max_iter } => {
            let paths = DatasetPaths::new(&data_dir);
            let queries = load_queries(paths.queries())?;
            let qrels = load_qrels(paths.qrels())?;
            let opts = TuningOptions { top_k, num_queries, max_iter };
            let report = tune(client, &queries, &qrels, opts).await?;

            println!("Original  Accuracy: {:.4}  MRR: {:.4}", report.before.accuracy, report.before.mrr);
            println!("Expanded  Accuracy: {:.4}  MRR: {:.4}", report.after.accuracy, report.after.mrr);
            for q in &report.queries {
                println!();
                println!("QID {}", q.qid);
                println!("  original: {}  -> {:?}", q.original, q.before);
                println!("  expanded: {}  -> {:?}", q.tuned, q.after);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let mut client = ToolClient::new(ServerCommand::new(&cli.server).args(&cli.server_args));
    let outcome = run(&mut client, cli.command).await;
    client.stop().await?;
    outcome
}
