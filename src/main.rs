use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use coderag::config::{Config, Credentials};
use coderag::db::{Db, VectorIndex};
use coderag::embedder::download::download_model_files;
use coderag::indexer::Indexer;
use coderag::llm::Backend;
use coderag::mcp::{McpContext, McpServer};
use coderag::rag::RagEngine;

#[derive(Parser, Debug)]
#[command(
    name = "coderag",
    version,
    about = "Index a code repository and ask questions about it"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the MCP tools over stdio
    Serve,
    /// Index a repository
    Ingest {
        /// Repository root
        path: PathBuf,
        /// Extra ignore pattern (repeatable)
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },
    /// Semantic search over the index
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict results to one repository-relative file
        #[arg(long)]
        file: Option<String>,
    },
    /// Answer a question using the indexed code
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print collection statistics
    Stats,
    /// Remove every record from the collection
    Clear,
    /// Fetch the ONNX model and tokenizer files
    DownloadModel {
        /// Target directory (defaults to the configured model_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn init_tracing() {
    // stdout belongs to the MCP transport
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_index(config: &Config) -> Result<VectorIndex> {
    let cfg = config.clone();
    let embedder = tokio::task::spawn_blocking(move || cfg.build_embedder())
        .await
        .context("embedder initialisation panicked")??;

    let db = Db::open(&config.db_path).context("Failed to open database")?;
    VectorIndex::open(
        Arc::new(TokioMutex::new(db)),
        embedder,
        &config.collection_name,
    )
    .await
    .with_context(|| format!("Failed to open collection '{}'", config.collection_name))
}

fn backend(config: &Config) -> Result<Option<Backend>> {
    let backend = Backend::from_credentials(&config.llm, &Credentials::from_env())
        .context("Failed to initialise generation backend")?;
    if backend.is_none() {
        warn!("Neither GROQ_API_KEY nor ANTHROPIC_API_KEY is set; generation is disabled");
    }
    Ok(backend)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Serve => {
            let index = open_index(&config).await?;
            let backend = backend(&config)?;
            let ctx = McpContext::new(Arc::new(config), index, backend);
            McpServer::new(ctx).start().await?;
        }
        Command::Ingest { path, ignore } => {
            let mut config = config;
            config.ingestion.ignore_patterns.extend(ignore);
            let index = open_index(&config).await?;
            let indexer = Indexer::from_config(index, &config);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted; stopping after the current batch");
                    on_signal.cancel();
                }
            });

            let report = indexer
                .index_repository(&path, None, &cancel)
                .await
                .with_context(|| format!("Failed to index {}", path.display()))?;
            print_json(&report)?;
        }
        Command::Search { query, top_k, file } => {
            let index = open_index(&config).await?;
            let k = top_k.unwrap_or(config.retrieval.top_k);
            let hits = match file {
                Some(file) => index.search_by_file(&query, &file, k).await?,
                None => index.search(&query, k, None).await?,
            };
            print_json(&hits)?;
        }
        Command::Ask { question, top_k } => {
            let Some(backend) = backend(&config)? else {
                bail!("set GROQ_API_KEY or ANTHROPIC_API_KEY to enable answers");
            };
            let index = open_index(&config).await?;
            let engine = RagEngine::new(index, backend, config.rag_config());
            let answer = engine.query(&question, top_k).await?;
            println!("{}\n", answer.answer);
            for source in &answer.sources {
                println!(
                    "  {}:{} ({:.2})",
                    source.file, source.line_range, source.similarity
                );
            }
        }
        Command::Stats => {
            let index = open_index(&config).await?;
            print_json(&index.statistics().await?)?;
        }
        Command::Clear => {
            let index = open_index(&config).await?;
            index.clear().await?;
            println!("Collection '{}' cleared", config.collection_name);
        }
        Command::DownloadModel { dir } => {
            let dir = dir.unwrap_or_else(|| config.model_dir());
            let target = dir.clone();
            tokio::task::spawn_blocking(move || download_model_files(&target))
                .await
                .context("download task panicked")??;
            println!("Model files ready in {}", dir.display());
        }
    }

    Ok(())
}
